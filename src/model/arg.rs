use clap::Parser;

/// Gemini OpenAI 兼容网关
#[derive(Parser, Debug)]
#[command(name = "gemini-openai-rs", version, about)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.json")]
    pub config: String,

    /// 监听地址（覆盖配置文件）
    #[arg(long)]
    pub host: Option<String>,

    /// 监听端口（覆盖配置文件）
    #[arg(long)]
    pub port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_and_overrides() {
        let args = Args::parse_from(["gemini-openai-rs"]);
        assert_eq!(args.config, "config.json");
        assert_eq!(args.host, None);
        assert_eq!(args.port, None);

        let args = Args::parse_from([
            "gemini-openai-rs",
            "-c",
            "/etc/gateway.json",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
        ]);
        assert_eq!(args.config, "/etc/gateway.json");
        assert_eq!(args.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(args.port, Some(9000));
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Args::try_parse_from(["gemini-openai-rs", "--port", "99999"]).is_err());
    }
}
