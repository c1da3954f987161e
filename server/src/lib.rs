pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_port")]
        pub port: u16,
        pub jwt_secret: String,
        #[serde(default = "default_media_dir")]
        pub media_dir: String,
        #[serde(default = "default_undo_window_secs")]
        pub undo_window_secs: u64,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = config::Config::builder()
                .add_source(config::Environment::default())
                .build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_media_dir() -> String {
        "media".to_string()
    }

    fn default_undo_window_secs() -> u64 {
        5
    }
}

pub mod auth;
pub mod entities;
pub mod media;
pub mod task;
pub mod user;
pub mod web;
