use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

const BINARIES: [&str; 2] = ["beacon-cli", "beacon-tui"];

#[derive(Parser)]
#[command(name = "xtask", about = "Beacon 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建所有组件 (release)
    Build,
    /// 运行 TUI (开发模式)
    Tui {
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
        /// 日志输出文件 (默认 /tmp/beacon.log)
        #[arg(short = 'o', long)]
        log_file: Option<String>,
        /// 使用模拟信标
        #[arg(long)]
        simulate: bool,
    },
    /// 设置 capabilities (免 sudo 扫描)
    SetupCaps,
    /// 运行测试
    Test,
    /// 运行测试并生成覆盖率报告
    Coverage,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // 确保在项目根目录执行
    let project_root = match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => std::path::PathBuf::from(dir)
            .parent()
            .map(|p| p.to_path_buf())
            .context("xtask has no parent directory")?,
        Err(_) => std::env::current_dir()?,
    };
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build => build(&sh)?,
        Commands::Tui {
            log_level,
            log_file,
            simulate,
        } => tui(&sh, &log_level, log_file, simulate)?,
        Commands::SetupCaps => setup_caps(&sh)?,
        Commands::Test => test(&sh)?,
        Commands::Coverage => coverage(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建所有组件...");
    cmd!(sh, "cargo build --release -p beacon-cli -p beacon-tui").run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn tui(sh: &Shell, log_level: &str, log_file: Option<String>, simulate: bool) -> Result<()> {
    let log_file = log_file.unwrap_or_else(|| "/tmp/beacon.log".to_string());

    println!("🖥️  启动 TUI 调试模式...");
    println!("   日志级别: {}", log_level);
    println!("   日志文件: {}", log_file);
    println!();
    println!("💡 提示: 在另一个终端运行以下命令查看实时日志:");
    println!("   tail -f {}", log_file);
    println!();

    let rust_log = format!(
        "{level},beacon_core={level},bluer=info",
        level = log_level
    );
    let args = if simulate { " -- --simulate" } else { "" };

    // 使用 shell 执行以支持重定向
    let command = format!(
        "RUST_LOG='{}' cargo run -p beacon-tui{} 2>> '{}'",
        rust_log, args, log_file
    );

    cmd!(sh, "bash -c {command}").run()?;

    println!();
    println!("📁 日志已保存到: {}", log_file);
    Ok(())
}

fn setup_caps(sh: &Shell) -> Result<()> {
    println!("🔐 设置 capabilities (免 sudo 扫描)...");

    build(sh)?;

    // CAP_NET_RAW: BLE 扫描
    // CAP_NET_ADMIN: 打开适配器电源
    for bin in BINARIES {
        let path = format!("target/release/{}", bin);
        cmd!(sh, "sudo setcap 'cap_net_admin,cap_net_raw+eip' {path}").run()?;
    }

    println!("✅ Capabilities 设置完成");
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn coverage(sh: &Shell) -> Result<()> {
    println!("📊 运行测试覆盖率分析...");

    // 检查 cargo-tarpaulin 是否安装
    if cmd!(sh, "cargo tarpaulin --version").run().is_err() {
        println!("📦 安装 cargo-tarpaulin...");
        cmd!(sh, "cargo install cargo-tarpaulin").run()?;
    }

    println!("🔍 分析中...");
    cmd!(
        sh,
        "cargo tarpaulin --packages beacon-core --out Html --output-dir target/coverage"
    )
    .run()?;

    println!("✅ 覆盖率报告已生成");
    println!("   HTML 报告: target/coverage/tarpaulin-report.html");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    println!("✅ 清理完成");
    Ok(())
}
