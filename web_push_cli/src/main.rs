//! Web Push 推送管理 CLI 工具

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use web_push_core::{
    ApplicationServerKeys, DeliveryResult, DeviceSubscription, DispatchConfig, DispatchEngine,
    OutboundMessage, SqliteRegistry, SubscriptionJson, SubscriptionRegistry,
};

#[derive(Parser)]
#[command(name = "web-push")]
#[command(about = "Web Push 推送管理工具", long_about = None)]
struct Cli {
    /// 注册表数据库路径
    #[arg(short, long, default_value = ".push.db")]
    db: PathBuf,

    /// VAPID 私钥文件路径
    #[arg(short, long, default_value = ".vapid_key")]
    key_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成 VAPID 密钥对
    GenKeys,
    /// 显示应用服务器公钥
    ShowKey,
    /// 导入设备订阅（浏览器导出的 JSON 文件）
    Register {
        /// 订阅身份
        #[arg(short, long)]
        identity: String,
        /// 订阅 JSON 文件路径
        #[arg(short, long)]
        subscription: PathBuf,
    },
    /// 删除订阅记录
    Unregister {
        /// 订阅身份
        #[arg(short, long)]
        identity: String,
    },
    /// 发送通知
    Send {
        /// 订阅身份
        #[arg(short, long)]
        identity: String,
        /// 通知正文
        #[arg(short, long)]
        message: String,
        /// 通知标题
        #[arg(short, long, default_value = "Notification")]
        title: String,
        /// VAPID 联系方式（sub 声明）
        #[arg(long, default_value = "mailto:admin@example.com")]
        contact: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::GenKeys => {
            do_gen_keys(&cli.key_file)?;
        }
        Commands::ShowKey => {
            do_show_key(&cli.key_file)?;
        }
        Commands::Register {
            identity,
            subscription,
        } => {
            do_register(&cli.db, &identity, &subscription).await?;
        }
        Commands::Unregister { identity } => {
            do_unregister(&cli.db, &identity).await?;
        }
        Commands::Send {
            identity,
            message,
            title,
            contact,
        } => {
            do_send(&cli.db, &cli.key_file, &identity, &title, &message, &contact).await?;
        }
    }

    Ok(())
}

fn do_gen_keys(key_file: &Path) -> anyhow::Result<()> {
    if key_file.exists() {
        anyhow::bail!("密钥文件已存在: {:?}（如需重新生成请先删除）", key_file);
    }

    let keys = ApplicationServerKeys::generate();
    keys.save(key_file)?;

    println!("VAPID 密钥对已生成");
    println!("私钥已保存到 {:?} 文件", key_file);
    println!("公钥: {}", keys.public_key_base64());
    println!("公钥(原始字节): {}", hex::encode(keys.public_key_bytes()));

    Ok(())
}

fn do_show_key(key_file: &Path) -> anyhow::Result<()> {
    let keys = load_keys(key_file)?;
    println!("公钥: {}", keys.public_key_base64());
    Ok(())
}

async fn do_register(db: &Path, identity: &str, subscription_file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(subscription_file)
        .map_err(|_| anyhow::anyhow!("无法读取订阅文件: {:?}", subscription_file))?;
    let json: SubscriptionJson = serde_json::from_str(&text)?;
    let handle = DeviceSubscription::try_from(json)?;

    let registry = SqliteRegistry::open(db)?;
    registry.register(identity, handle).await?;

    println!("订阅已登记: {}", identity);
    Ok(())
}

async fn do_unregister(db: &Path, identity: &str) -> anyhow::Result<()> {
    let registry = SqliteRegistry::open(db)?;
    registry.delete(identity).await?;

    println!("订阅已删除: {}", identity);
    Ok(())
}

async fn do_send(
    db: &Path,
    key_file: &Path,
    identity: &str,
    title: &str,
    message: &str,
    contact: &str,
) -> anyhow::Result<()> {
    let keys = load_keys(key_file)?;
    let registry = Arc::new(SqliteRegistry::open(db)?);

    let config = DispatchConfig {
        contact: contact.to_string(),
        ..DispatchConfig::default()
    };
    let engine = DispatchEngine::new(keys, registry, config)?;

    println!("正在发送...");
    let message = OutboundMessage::new(title, message);

    match engine.send(identity, &message).await? {
        DeliveryResult::Delivered => println!("发送成功"),
        DeliveryResult::NotSubscribed => println!("该身份没有订阅记录"),
        DeliveryResult::StaleSubscription => println!("订阅已失效，记录已清理"),
        DeliveryResult::TemporaryFailure => println!("推送服务暂时不可用，请稍后重试"),
        DeliveryResult::RejectedRequest { status } => {
            println!("请求被推送服务拒绝 (HTTP {})", status)
        }
    }

    Ok(())
}

fn load_keys(key_file: &Path) -> anyhow::Result<ApplicationServerKeys> {
    ApplicationServerKeys::load(key_file)
        .map_err(|_| anyhow::anyhow!("请先生成密钥（{:?} 文件不存在或已损坏）", key_file))
}
