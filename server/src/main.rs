#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let config = etask_server::config::Config::from_env()?;
    etask_server::web::start_web_server(config).await
}
