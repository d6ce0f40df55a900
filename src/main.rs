#[tokio::main]
async fn main() {
    if let Err(e) = cardia::run().await {
        eprintln!("cardia: {}", e);
        std::process::exit(1);
    }
}
