#[tokio::main]
async fn main() -> anyhow::Result<()> {
    expense_auth::server::run().await
}
