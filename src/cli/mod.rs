//! CLI Module - Command line interface utilities

use crate::config::Config;

pub async fn run_init(output: String) -> Result<(), Box<dyn std::error::Error>> {
    println!("Initializing configuration file at {}...", output);
    let default_config = Config::default().export_toml()?;
    tokio::fs::write(&output, default_config).await?;
    println!("Configuration file created successfully.");
    Ok(())
}

pub async fn run_status(host: String) -> Result<(), Box<dyn std::error::Error>> {
    let base_url = if host.starts_with("http") {
        host.clone()
    } else {
        format!("http://{}", host)
    };
    println!("Checking status of {}...", base_url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(2))
        .build()?;

    match client.get(format!("{}/health", base_url)).send().await {
        Ok(res) => {
            if res.status().is_success() {
                println!("SUCCESS: Server is UP and responding.");
                let body: serde_json::Value = res.json().await?;
                println!("Health: {}", body);
            } else {
                println!(
                    "WARNING: Server responded with error status: {}",
                    res.status()
                );
            }
        }
        Err(e) => {
            println!("ERROR: Could not connect to server: {}", e);
            println!("Is the server running?");
        }
    }
    Ok(())
}
