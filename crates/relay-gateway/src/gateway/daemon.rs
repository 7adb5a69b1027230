use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use relay_core::backend::{AnswerBackends, OpenAiClient};
use relay_core::config::DigestConfig;
use relay_core::news::{DigestJob, HackerNewsSource, NewsSource, V2exSource};
use relay_core::slack::{ChatPlatform, SlackClient};
use relay_core::{MentionHandler, RelayConfig};

use super::http::{router, AppState};

/// Run the Slack gateway until Ctrl-C
#[tokio::main]
pub async fn run_gateway(config: RelayConfig) -> Result<()> {
    tracing::info!(bind_addr = %config.bind_addr, model = %config.model, "starting relay gateway");

    let slack_token = config
        .slack_token
        .clone()
        .context("Slack bot token missing")?;
    let openai_api_key = config
        .openai_api_key
        .clone()
        .context("OpenAI API key missing")?;

    let slack = Arc::new(SlackClient::new(slack_token));
    let bot_user_id = resolve_bot_user_id(&config, &slack).await;

    tokio::fs::create_dir_all(&config.cache_dir)
        .await
        .with_context(|| format!("Failed to create cache dir {}", config.cache_dir.display()))?;

    let platform: Arc<dyn ChatPlatform> = slack;
    let backends = AnswerBackends::openai(OpenAiClient::new(
        openai_api_key,
        config.openai_api_base.clone(),
        config.model.clone(),
    ));
    let handler = Arc::new(
        MentionHandler::new(&config, platform.clone(), backends).with_bot_user_id(bot_user_id),
    );

    let shutdown = CancellationToken::new();
    if config.digest.enabled {
        spawn_digest(&config.digest, platform, shutdown.clone());
    } else {
        tracing::info!("daily digest disabled");
    }

    if config.slack_signing_secret.is_none() {
        tracing::warn!("no signing secret configured, Slack requests will not be verified");
    }
    let state = AppState::new(handler, config.slack_signing_secret.clone());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(bind_addr = %config.bind_addr, "listening for Slack events on /slack/events");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

async fn resolve_bot_user_id(config: &RelayConfig, slack: &SlackClient) -> Option<String> {
    if let Some(id) = &config.bot_user_id {
        return Some(id.clone());
    }
    match slack.bot_user_id().await {
        Ok(id) => {
            tracing::info!(bot_user_id = %id, "resolved bot user id");
            Some(id)
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not resolve bot user id, mentions will not be stripped");
            None
        }
    }
}

fn spawn_digest(digest: &DigestConfig, platform: Arc<dyn ChatPlatform>, cancel: CancellationToken) {
    let sources: Vec<Arc<dyn NewsSource>> = vec![
        Arc::new(HackerNewsSource::new()),
        Arc::new(V2exSource::new()),
    ];
    let job = DigestJob::new(sources, platform, digest.channel.clone());
    let (hour, minute) = (digest.hour, digest.minute);

    tokio::spawn(async move {
        if let Err(e) = job.run_daily(hour, minute, cancel).await {
            tracing::error!(error = %e, "digest scheduler stopped");
        }
    });
}
