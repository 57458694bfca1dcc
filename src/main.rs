use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use weixin::{Client, ClientConfig, Message};

const USAGE: &str = "usage: weixin-send <agentid> <touser> <text...>";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [agentid, touser, text @ ..] = args.as_slice() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    if text.is_empty() {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    }
    let Ok(agentid) = agentid.parse::<i64>() else {
        eprintln!("agentid must be a number, got {agentid:?}");
        return ExitCode::from(2);
    };

    let client = match ClientConfig::from_env().and_then(Client::with_config) {
        Ok(client) => client,
        Err(err) => {
            error!(%err, "unable to set up client");
            return ExitCode::FAILURE;
        }
    };

    let message = Message::text(agentid, text.join(" ")).to_users(touser.split('|'));
    match client.send_message(&message).await {
        Ok(response) => {
            info!(msgid = %response.msgid, "message sent");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "unable to send message");
            ExitCode::FAILURE
        }
    }
}
