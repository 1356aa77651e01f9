use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ghrelay_core::{
    config::Config,
    dispatcher::Dispatcher,
    domain::ChatId,
    messaging::port::MessagingPort,
    poller::Poller,
    rate_limit::RateLimiter,
    source::ActivitySource,
};
use ghrelay_github::{GithubConfig, GithubEventSource};
use ghrelay_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    ghrelay_core::logging::init("ghrelay", cfg.log_format)?;

    let source: Arc<dyn ActivitySource> = Arc::new(
        GithubEventSource::new(GithubConfig {
            api_base: cfg.github_api_base.clone(),
            username: cfg.github_username.clone(),
            token: cfg.github_token.clone(),
            user_agent: cfg.github_user_agent.clone(),
            timeout: cfg.http_timeout,
        })
        .context("building GitHub client")?,
    );

    let telegram = TelegramMessenger::from_token(cfg.telegram_bot_token.clone());
    match telegram.verify().await {
        Ok(username) => info!(bot = %username, "telegram bot ready"),
        Err(e) => warn!(error = %e, "could not verify telegram bot, continuing"),
    }
    let messenger: Arc<dyn MessagingPort> = Arc::new(telegram);

    let limiter = Arc::new(RateLimiter::new(cfg.rate_limit()));
    let dispatcher = Dispatcher::new(messenger, limiter, ChatId(cfg.telegram_chat_id))
        .with_default_retry_after(cfg.default_retry_after);
    let poller = Arc::new(Poller::new(source, dispatcher, cfg.poller()));

    info!(
        user = %cfg.github_username,
        chat_id = cfg.telegram_chat_id,
        authenticated = cfg.github_token.is_some(),
        "relaying GitHub activity"
    );

    let cancel = CancellationToken::new();
    let task = tokio::spawn(poller.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown requested");
    cancel.cancel();
    task.await.context("poller task failed")?;

    Ok(())
}
