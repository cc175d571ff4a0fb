use tokio::{fs, io::AsyncReadExt};

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    pub server: ServerConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds, e.g. "0.0.0.0:7777".
    pub listen_addr: String,
    /// How many accepts are kept outstanding at all times. Clamped to >= 1.
    #[serde(default = "default_accept_parallelism")]
    pub accept_parallelism: usize,
    /// Listen queue depth for connections awaiting acceptance. Clamped to >= 100.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

fn default_accept_parallelism() -> usize {
    8
}

fn default_backlog() -> u32 {
    512
}

impl ServerConfig {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            accept_parallelism: default_accept_parallelism(),
            backlog: default_backlog(),
        }
    }
}

impl Config {
    pub async fn from_path(path: &str) -> Self {
        let mut file = fs::File::open(path).await.unwrap();
        let mut s = String::new();
        file.read_to_string(&mut s).await.unwrap();

        toml::from_str::<Config>(&s).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_omitted() {
        let cfg = toml::from_str::<Config>(
            r#"
            [server]
            listen_addr = "127.0.0.1:7777"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.listen_addr, "127.0.0.1:7777");
        assert_eq!(cfg.server.accept_parallelism, 8);
        assert_eq!(cfg.server.backlog, 512);
    }

    #[test]
    fn explicit_values_win() {
        let cfg = toml::from_str::<Config>(
            r#"
            [server]
            listen_addr = "0.0.0.0:9000"
            accept_parallelism = 2
            backlog = 128
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.accept_parallelism, 2);
        assert_eq!(cfg.server.backlog, 128);
    }
}
