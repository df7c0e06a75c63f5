//! tracedock CLI entry point.

use tracedock_lib::cli::{self, Cli};
use tracedock_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    cli::execute(cli).await
}
