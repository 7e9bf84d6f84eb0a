#[tokio::main]
async fn main() -> anyhow::Result<()> {
    plugsort_lib::run().await
}
