use anyhow::Result;

use powerocean_bridge::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    powerocean_bridge::app(options).await
}
