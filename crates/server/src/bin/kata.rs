use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    kata_server::main_entry().await
}
