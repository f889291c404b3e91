//! Beacon CLI
//!
//! 命令行扫描 iBeacon，以及布局、时间戳、配置等辅助工具

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use beacon_core::{
    AlwaysGranted, AppSettings, Beacon, BeaconEvent, BeaconLayout, BeaconService,
    BluerBeaconService, BluezPermission, ChannelNotifier, Dispatcher, PermissionCheck,
    RegionEvent, RowStyle, ScanSession, SimulatedBeaconService, StartOutcome, format_beacon,
    format_timestamp,
};
use beacon_core::display::format_timestamp_in;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "beacon-cli", version, about = "iBeacon 区域监控与测距工具")]
struct Cli {
    /// 输出调试日志到 stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 扫描并打印测距到的信标
    Scan {
        /// 扫描时长 (秒)，0 表示直到 Ctrl-C
        #[arg(short, long, default_value = "10")]
        timeout: u64,
        /// 使用模拟信标代替蓝牙适配器
        #[arg(long)]
        simulate: bool,
        /// 行格式 (默认使用配置文件中的设置)
        #[arg(long, value_enum)]
        style: Option<StyleArg>,
        /// 每个事件输出一行 JSON
        #[arg(long)]
        json: bool,
    },
    /// 解析信标布局，可选解码一段厂商数据
    Layout {
        /// 布局描述，例如 m:2-3=0215,i:4-19,i:20-21,i:22-23,p:24-24
        layout: String,
        /// 厂商数据 (十六进制，不含厂商 ID)
        #[arg(short, long)]
        data: Option<String>,
        /// 厂商 ID
        #[arg(short, long, default_value = "0x004c")]
        company: String,
    },
    /// 把 epoch 毫秒格式化为列表使用的时间格式
    Timestamp {
        millis: i64,
        /// 使用 UTC 而非本地时区
        #[arg(long)]
        utc: bool,
    },
    /// 查看或初始化配置文件
    Config {
        /// 只打印配置文件路径
        #[arg(long)]
        path: bool,
        /// 写入当前（或默认）配置
        #[arg(long)]
        init: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StyleArg {
    Timestamped,
    RawPower,
}

impl From<StyleArg> for RowStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Timestamped => RowStyle::Timestamped,
            StyleArg::RawPower => RowStyle::RawPower,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan {
            timeout,
            simulate,
            style,
            json,
        } => {
            let settings = AppSettings::load();
            let style = style.map_or(settings.row_style, RowStyle::from);
            let options = ScanOptions {
                timeout,
                style,
                json,
            };
            if simulate {
                let service = SimulatedBeaconService::new(
                    settings.scan_period(),
                    settings.region_exit_period(),
                );
                scan(service, Box::new(AlwaysGranted), &settings, options).await?;
            } else {
                let service = BluerBeaconService::new(
                    settings.scan_period(),
                    settings.region_exit_period(),
                );
                scan(service, Box::new(BluezPermission), &settings, options).await?;
            }
        }
        Commands::Layout {
            layout,
            data,
            company,
        } => {
            let layout = BeaconLayout::parse(&layout)?;
            println!("布局: {}", layout);
            println!("标识符数量: {}", layout.identifier_count());

            if let Some(data) = data {
                let company_id = parse_company_id(&company)?;
                let bytes = decode_hex(&data)?;
                match layout.parse_advertisement(company_id, &bytes) {
                    Some(parsed) => {
                        for (i, id) in parsed.identifiers.iter().enumerate() {
                            println!("   id{}: {}", i + 1, id);
                        }
                        if let Some(tx) = parsed.tx_power {
                            println!("   TxPower: {}", tx);
                        }
                        for (i, value) in parsed.data_fields.iter().enumerate() {
                            println!("   data{}: {}", i + 1, value);
                        }
                    }
                    None => println!("   数据与布局不匹配"),
                }
            }
        }
        Commands::Timestamp { millis, utc } => {
            if utc {
                println!("{}", format_timestamp_in(millis, &Utc));
            } else {
                println!("{}", format_timestamp(millis));
            }
        }
        Commands::Config { path, init } => {
            let config_path = AppSettings::config_path();
            if path {
                println!("{}", config_path.display());
            } else {
                let settings = AppSettings::load();
                if init {
                    settings.save()?;
                    println!("✅ 已写入 {}", config_path.display());
                }
                println!("{:#?}", settings);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,bluer=info")
        } else {
            EnvFilter::new("warn")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

struct ScanOptions {
    timeout: u64,
    style: RowStyle,
    json: bool,
}

async fn scan<S: BeaconService>(
    service: S,
    permission: Box<dyn PermissionCheck>,
    settings: &AppSettings,
    options: ScanOptions,
) -> Result<()> {
    let (notifier, mut events) = ChannelNotifier::new(256);
    let mut session = ScanSession::new(
        service,
        permission,
        settings.layout()?,
        settings.region()?,
        settings.lifecycle,
        Arc::new(notifier),
    );

    session.resume().await;
    match session.start().await {
        StartOutcome::Started => {}
        StartOutcome::PermissionDenied(status) => {
            session.destroy();
            bail!("{}", status.notice().unwrap_or("权限不足"));
        }
        StartOutcome::Unavailable => {
            session.destroy();
            bail!("扫描服务不可用");
        }
    }

    if !options.json {
        println!("🔍 扫描区域 {} ...", session.region());
    }

    let mut dispatcher = Dispatcher::new(options.style);
    let deadline = (options.timeout > 0).then(|| Duration::from_secs(options.timeout));
    let sleep = tokio::time::sleep(deadline.unwrap_or(Duration::MAX));
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if options.json {
                    println!("{}", event_json(&event, options.style));
                }
                let rows_before = dispatcher.list().len();
                if let Some(notice) = dispatcher.handle(event) {
                    if !options.json {
                        println!("🔔 {}", notice);
                    }
                }
                if !options.json {
                    for row in &dispatcher.list().rows()[rows_before..] {
                        println!("{}", row);
                    }
                }
            }
            _ = &mut sleep, if deadline.is_some() => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.stop();
    session.destroy();

    if !options.json {
        println!("共记录 {} 条", dispatcher.list().len());
    }
    Ok(())
}

fn event_json(event: &BeaconEvent, style: RowStyle) -> serde_json::Value {
    match event {
        BeaconEvent::RegionTransition(RegionEvent::Entered(region)) => {
            json!({ "event": "enter", "region": region.unique_id() })
        }
        BeaconEvent::RegionTransition(RegionEvent::Exited(region)) => {
            json!({ "event": "exit", "region": region.unique_id() })
        }
        BeaconEvent::RegionTransition(RegionEvent::Determined { state, region }) => {
            json!({ "event": "determine", "state": state.code(), "region": region.unique_id() })
        }
        BeaconEvent::RangeBatch { beacons, region } => json!({
            "event": "range",
            "region": region.unique_id(),
            "beacons": beacons.iter().map(|b| beacon_json(b, style)).collect::<Vec<_>>(),
        }),
    }
}

fn beacon_json(beacon: &Beacon, style: RowStyle) -> serde_json::Value {
    let id = |n| beacon.id(n).map(ToString::to_string);
    json!({
        "uuid": id(1),
        "major": id(2),
        "minor": id(3),
        "rssi": beacon.rssi,
        "tx_power": beacon.tx_power,
        "distance": beacon.distance,
        "last_seen": beacon.last_seen,
        "address": beacon.address,
        "row": format_beacon(beacon, style),
    })
}

fn parse_company_id(s: &str) -> Result<u16> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    value.with_context(|| format!("无效的厂商 ID: {}", s))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if !s.is_ascii() {
        bail!("十六进制数据只能包含 ASCII 字符");
    }
    if s.len() % 2 != 0 {
        bail!("十六进制数据长度必须为偶数");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .with_context(|| format!("无效的十六进制数据: {}", &s[i..i + 2]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("02 15:c5").unwrap(), vec![0x02, 0x15, 0xc5]);
        assert!(decode_hex("123").is_err());
        assert!(decode_hex("zz").is_err());
        assert!(decode_hex("aéb").is_err());
        assert!(decode_hex("é1").is_err());
    }

    #[test]
    fn test_parse_company_id() {
        assert_eq!(parse_company_id("0x004c").unwrap(), 0x004c);
        assert_eq!(parse_company_id("76").unwrap(), 76);
        assert!(parse_company_id("0xfffff").is_err());
    }

    #[test]
    fn test_event_json_tags() {
        let region = beacon_core::Region::any("iBeacon");
        let value = event_json(
            &BeaconEvent::RangeBatch {
                beacons: vec![],
                region,
            },
            RowStyle::Timestamped,
        );
        assert_eq!(value["event"], "range");
        assert_eq!(value["beacons"].as_array().map(Vec::len), Some(0));
    }
}
