use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use trendlens::keystore::{self, FileStorage};
use trendlens::wire::{InstrumentType, OrderSide, OrderType, Pair, PositionSide, TradeMode};
use trendlens::{
    Config, Credential, ExchangeId, HttpProxy, InstrumentsStore, PostOrderRequest,
    RequestPipeline, SharedKeyStore, Wallet, init_tracing,
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(short, long, help = "Config path")]
    config: Option<String>,
    #[arg(short, long, default_value_t = tracing::Level::INFO)]
    level: tracing::Level,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 管理本地保存的 API 密钥
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },
    /// 查询账户余额
    Balances {
        exchange: ExchangeId,
        #[arg(long = "currency", help = "Currency filter, repeatable")]
        currencies: Vec<String>,
    },
    /// 不指定交易所时列出各交易所公开产品的汇总
    Instruments {
        #[arg(default_value = "Spot")]
        instrument_type: InstrumentType,
        #[arg(long)]
        exchange: Option<ExchangeId>,
        #[arg(long)]
        instrument_id: Option<Pair>,
    },
    /// 下单
    Order {
        exchange: ExchangeId,
        instrument_id: String,
        #[arg(long, default_value = "Spot")]
        instrument_type: InstrumentType,
        #[arg(long, default_value = "Buy")]
        side: OrderSide,
        #[arg(long = "type", default_value = "Market")]
        order_type: OrderType,
        #[arg(long)]
        size: f64,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        trade_mode: Option<TradeMode>,
        #[arg(long)]
        margin_currency: Option<String>,
        #[arg(long)]
        position_side: Option<PositionSide>,
    },
    /// 查询挂单
    Pending {
        exchange: ExchangeId,
        instrument_id: String,
        #[arg(long, default_value = "Spot")]
        instrument_type: InstrumentType,
    },
}

#[derive(Debug, Subcommand)]
enum KeysCommand {
    Add {
        exchange: ExchangeId,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        secret: String,
        #[arg(long)]
        passphrase: Option<String>,
        #[arg(long, help = "Store locally without registering with the proxy")]
        local_only: bool,
    },
    Remove {
        api_key: String,
    },
    List,
}

async fn connect(
    config: &Config,
    keys: SharedKeyStore<FileStorage>,
) -> anyhow::Result<RequestPipeline<HttpProxy, FileStorage>> {
    let mut wallet = Wallet::new();
    wallet.connect(&config.identity()?).await?;
    Ok(RequestPipeline::from_wallet(&wallet, keys))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(config: Config, command: Command) -> anyhow::Result<()> {
    let keys = config.key_store().shared();

    match command {
        Command::Keys { action } => match action {
            KeysCommand::Add {
                exchange,
                api_key,
                secret,
                passphrase,
                local_only,
            } => {
                let credential =
                    Credential::new(exchange, &api_key, &secret, passphrase.as_deref());
                if local_only {
                    keystore::lock(&keys)?.add(credential)?;
                } else {
                    connect(&config, keys).await?.register_key(credential).await?;
                }
                println!("{} key {} added", exchange, api_key);
            }
            KeysCommand::Remove { api_key } => {
                let removed = keystore::lock(&keys)?.remove(&api_key)?;
                println!("{} key(s) removed", removed);
            }
            KeysCommand::List => {
                for credential in keystore::lock(&keys)?.credentials() {
                    println!("{}\t{}", credential.exchange, credential.api_key);
                }
            }
        },
        Command::Balances {
            exchange,
            currencies,
        } => {
            let balances = connect(&config, keys)
                .await?
                .balances(exchange, &currencies)
                .await?;
            print_json(&balances)?;
        }
        Command::Instruments {
            instrument_type,
            exchange: Some(exchange),
            instrument_id,
        } => {
            let instruments = connect(&config, keys)
                .await?
                .instruments(exchange, instrument_type, instrument_id)
                .await?;
            print_json(&instruments)?;
        }
        Command::Instruments {
            instrument_type,
            exchange: None,
            ..
        } => {
            let mut store = InstrumentsStore::new(Arc::new(config.public_proxy()?));
            for (exchange, outcome) in store.load_all(instrument_type).await {
                if let Err(e) = outcome {
                    error!("{}: {}", exchange, e);
                }
            }
            for entry in store.unique_instruments(instrument_type) {
                println!("{}\t{}", entry.pair, entry.count);
            }
        }
        Command::Order {
            exchange,
            instrument_id,
            instrument_type,
            side,
            order_type,
            size,
            price,
            trade_mode,
            margin_currency,
            position_side,
        } => {
            let mut order = PostOrderRequest::for_instrument(instrument_type, &instrument_id)?
                .with_side(side)
                .with_order_type(order_type)
                .with_size(size);
            if let Some(price) = price {
                order = order.with_price(price);
            }
            if let Some(trade_mode) = trade_mode {
                order = order.with_trade_mode(trade_mode);
            }
            if let Some(currency) = margin_currency {
                order = order.with_margin_currency(&currency);
            }
            if let Some(position_side) = position_side {
                order = order.with_position_side(position_side);
            }

            let data = connect(&config, keys)
                .await?
                .post_order(exchange, &order)
                .await?;
            print_json(&data)?;
        }
        Command::Pending {
            exchange,
            instrument_id,
            instrument_type,
        } => {
            let orders = connect(&config, keys)
                .await?
                .pending_orders(exchange, instrument_type, &instrument_id)
                .await?;
            print_json(&orders)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let _guard = init_tracing(
        "trendlens",
        &config.log_dir,
        &args.level.to_string().to_lowercase(),
        config.log_format,
    )?;
    info!("proxy {}", config.proxy_url);

    if let Err(e) = run(config, args.command).await {
        error!("{}", e);
        return Err(e);
    }

    Ok(())
}
