//! `relayctl` (spec §6.1): a thin convenience wrapper over the library
//! functions the out-of-scope CLI needs. Not a hard requirement of the
//! core — its absence would not be a spec violation — but it
//! demonstrates the library surface (`relay_server::admin`) is usable
//! standalone, in the clap-derive idiom the corpus's CLI binaries use.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use relay_server::admin;
use relay_server::models::Bot;
use relay_server::store::pg::{init_db, DbConfig, PgTable};
use relay_server::util::time::now_epoch;

#[derive(Parser)]
#[command(name = "relayctl")]
#[command(about = "Admin CLI for the relay server's bot/invite/token surface")]
struct Cli {
    #[command(subcommand)]
    command: TopLevel,
}

#[derive(Subcommand)]
enum TopLevel {
    #[command(subcommand)]
    Tgbot(TgbotCommand),
    #[command(subcommand)]
    User(UserCommand),
}

#[derive(Subcommand)]
enum TgbotCommand {
    /// Registers a bot.
    Register {
        #[arg(long = "bot-name")]
        bot_name: String,
        #[arg(long, default_value = "tg")]
        kind: String,
        #[arg(long)]
        secret: String,
    },
    /// Creates a user + invite atomically, prints the invite URL.
    Invite {
        #[arg(long = "bot-name")]
        bot_name: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        tel: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Mints a 24h token, prints its id.
    CreateToken(IdentifierArgs),
    /// Posts a message on every live websocket of the user.
    SendWs {
        #[command(flatten)]
        identifier: IdentifierArgs,
        #[arg(short = 'm', long)]
        message: String,
    },
}

#[derive(Args)]
struct IdentifierArgs {
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    tel: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        TopLevel::Tgbot(TgbotCommand::Register { bot_name, kind, secret }) => {
            let table = connect().await?;
            let now = now_epoch();
            match admin::register_bot(&table, &bot_name, &kind, secret, now).await {
                Ok(Bot { pk, .. }) => {
                    println!("registered bot {pk}");
                }
                Err(e) => {
                    eprintln!("registration failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        TopLevel::Tgbot(TgbotCommand::Invite { bot_name, title, email, tel }) => {
            let table = connect().await?;
            let now = now_epoch();
            let bot_kind = std::env::var("TGBOT_KIND").unwrap_or_else(|_| "tg".to_string());
            let bot_pk = relay_server::models::keys::bot_pk(&bot_name, &bot_kind)?;
            let base_url = std::env::var("BOT_INVITE_BASE_URL")
                .unwrap_or_else(|_| format!("https://t.me/{bot_name}"));

            match admin::create_invite(
                &table,
                &bot_pk,
                &title,
                email.as_deref(),
                tel.as_deref(),
                &base_url,
                now,
            )
            .await
            {
                Ok(invite) => println!("{}", invite.url),
                Err(e) => {
                    eprintln!("invite creation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        TopLevel::User(UserCommand::CreateToken(IdentifierArgs { email, tel })) => {
            let table = connect().await?;
            let now = now_epoch();
            match admin::mint_token(&table, email.as_deref(), tel.as_deref(), now).await {
                Ok(token) => println!("{}", token.pk),
                Err(e) => {
                    eprintln!("token creation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        TopLevel::User(UserCommand::SendWs { identifier, message }) => {
            let admin_base_url =
                std::env::var("RELAY_ADMIN_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
            match admin::send_to_live_sockets(
                &admin_base_url,
                identifier.email.as_deref(),
                identifier.tel.as_deref(),
                &message,
            )
            .await
            {
                Ok(delivered) => println!("delivered to {delivered} connection(s)"),
                Err(e) => {
                    eprintln!("send-ws failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

async fn connect() -> Result<PgTable> {
    let pool = init_db(DbConfig::default()).await?;
    Ok(PgTable::new(pool))
}
