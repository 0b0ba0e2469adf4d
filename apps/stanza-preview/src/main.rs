use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result},
    clap::{Parser, Subcommand},
    imbridge_accounts::{
        AccountRef, BasicMessage, BridgeAccount, EventRouter, JoinProperties, MemoryPresenceCache,
    },
    imbridge_xmpp::{
        BareJid, Element, FullJid, MemoryWriter, XMPP_PROTOCOL_ID, XmppAccount,
        XmppAccountConfig, XmppConnection, route_stanza,
        stanza::{NS_CLIENT, NS_MUC_USER},
    },
};

/// Prints the stanzas an imbridge XMPP account would write.
///
/// Nothing is sent: stanzas are captured in memory and written to stdout,
/// one per line, in the order the account produced them.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Bare JID of the bridged account.
    #[arg(long, env = "IMBRIDGE_JID")]
    jid: String,

    /// TOML file with account settings. Defaults apply when omitted.
    #[arg(long, env = "IMBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a direct or room message.
    Message {
        to: String,
        body: String,
        /// Address a room instead of a single user.
        #[arg(long)]
        room: bool,
        #[arg(long)]
        html: Option<String>,
        #[arg(long = "attachment")]
        attachments: Vec<String>,
    },
    /// Join a room, optionally feeding back a synthetic confirmation.
    Join {
        room: String,
        server: String,
        #[arg(long)]
        handle: Option<String>,
        #[arg(long)]
        confirm: bool,
    },
    /// Retry a join that failed with a nick conflict.
    Retry {
        /// Occupant address the conflict came back from.
        occupant: String,
    },
    /// Leave a room.
    Leave {
        room: String,
        server: String,
        #[arg(long)]
        handle: Option<String>,
    },
    /// Request a user's vCard for an avatar.
    Avatar { who: String },
}

fn load_config(path: Option<&PathBuf>) -> Result<XmppAccountConfig> {
    let Some(path) = path else {
        return Ok(XmppAccountConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config in {}", path.display()))
}

fn room_properties(room: String, server: String, handle: Option<String>) -> JoinProperties {
    let mut props = JoinProperties::from([
        ("room".to_string(), room),
        ("server".to_string(), server),
    ]);
    if let Some(handle) = handle {
        props.insert("handle".into(), handle);
    }
    props
}

/// The self-presence a MUC service reflects back once a join succeeds.
fn self_presence(occupant: &str, account: &str) -> Element {
    Element::builder("presence", NS_CLIENT)
        .attr("from", occupant)
        .attr("to", account)
        .append(
            Element::builder("x", NS_MUC_USER)
                .append(
                    Element::builder("status", NS_MUC_USER)
                        .attr("code", "110")
                        .build(),
                )
                .build(),
        )
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let jid: BareJid = args.jid.parse().context("invalid --jid")?;

    let writer = Arc::new(MemoryWriter::new());
    let router = Arc::new(EventRouter::new());
    let account = XmppAccount::new(&jid, config, XmppConnection {
        writer: writer.clone(),
        presence: Arc::new(MemoryPresenceCache::new()),
        router: Arc::clone(&router),
    });
    tracing::info!(remote_id = %account.remote_id(), "previewing account");

    match args.command {
        Command::Message {
            to,
            body,
            room,
            html,
            attachments,
        } => {
            let mut message = BasicMessage::text(body);
            if let Some(html) = html {
                message = message.with_html(html);
            }
            for uri in attachments {
                message = message.with_attachment(uri);
            }
            if room {
                account.send_room_message(&to, &message).await?;
            } else {
                account.send_direct_message(&to, &message).await?;
            }
        },
        Command::Join {
            room,
            server,
            handle,
            confirm,
        } => {
            let props = room_properties(room, server, handle);
            let pending = account
                .join_room(props, account.config().join_timeout(), true)
                .await?;
            if confirm {
                let occupant = pending.key().to_string();
                let to = format!("{jid}/{}", account.config().resource);
                route_stanza(&router, self_presence(&occupant, &to));
                let joined = pending.wait().await?;
                let ours = joined.account == AccountRef::new(jid.to_string(), XMPP_PROTOCOL_ID);
                tracing::info!(room = %joined.conversation.name, ours, "join confirmed");
            }
        },
        Command::Retry { occupant } => {
            let from: FullJid = occupant.parse().context("invalid occupant address")?;
            let _pending = account.retry_join(&from).await?;
        },
        Command::Leave {
            room,
            server,
            handle,
        } => {
            account
                .leave_room(&room_properties(room, server, handle))
                .await?;
        },
        Command::Avatar { who } => {
            let _pending = account.fetch_avatar("", &who).await?;
        },
    }

    for stanza in writer.take() {
        println!("{stanza}");
    }
    Ok(())
}
