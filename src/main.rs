#[tokio::main]
async fn main() -> anyhow::Result<()> {
    recovery_chat_lib::run().await
}
