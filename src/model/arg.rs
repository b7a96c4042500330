use clap::Parser;

/// Ollama 本地 Web 控制台
#[derive(Parser, Debug)]
#[command(name = "ollama-web", version, about)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<String>,

    /// 监听端口（覆盖配置文件与 PORT 环境变量）
    #[arg(long)]
    pub port: Option<u16>,

    /// Ollama 端口（覆盖配置文件与 OLLAMA_PORT 环境变量）
    #[arg(long)]
    pub ollama_port: Option<u16>,

    /// 不自动拉起 `ollama serve`
    #[arg(long)]
    pub no_auto_start: bool,
}
