//! rejection-sorter - Entry point for the inbox sweep

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use rejection_sorter::config::{ClassifierMode, Settings};
use rejection_sorter::providers::ai::OpenAiCompatibleProvider;
use rejection_sorter::providers::email::{GmailCredentials, GmailMailbox, Mailbox, Pagination};
use rejection_sorter::services::{
    run_until_done, Classifier, DriverState, InvocationDriver, KeywordClassifier, LlmClassifier,
    LocalScheduler, SweepService,
};
use rejection_sorter::storage::{JsonProgressStore, KeychainAccess, ProgressStore};

use cli::{Cli, Command, StoreCredentialsArgs};

const GMAIL_CLIENT_ID_ENV: &str = "GMAIL_CLIENT_ID";
const GMAIL_CLIENT_SECRET_ENV: &str = "GMAIL_CLIENT_SECRET";
const GMAIL_REFRESH_TOKEN_ENV: &str = "GMAIL_REFRESH_TOKEN";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    tracing::info!("Starting rejection-sorter");

    if let Err(e) = run(cli).await {
        tracing::error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let settings = Arc::new(settings);
    let keychain = KeychainAccess::new();

    match cli.command {
        Command::Run => {
            let scheduler = Arc::new(LocalScheduler::new());
            let driver = build_driver(&settings, &keychain, Arc::clone(&scheduler)).await?;
            let state = run_until_done(&driver).await;
            tracing::info!(?state, "sweep finished");
        }
        Command::Once => {
            let scheduler = Arc::new(LocalScheduler::new());
            let driver = build_driver(&settings, &keychain, Arc::clone(&scheduler)).await?;
            match driver.invoke().await {
                DriverState::Done => println!("done"),
                DriverState::Running => {
                    let wait = scheduler
                        .pending()
                        .map(|at| at.saturating_duration_since(tokio::time::Instant::now()))
                        .unwrap_or_default();
                    println!("running; invoke again in {}s", wait.as_secs());
                }
            }
        }
        Command::Check => check(&settings, &keychain).await?,
        Command::Reset => {
            let store = progress_store()?;
            store.clear().await.context("failed to clear scan cursor")?;
            println!("cleared {}", store.path().display());
        }
        Command::StoreCredentials(args) => store_credentials(&settings, &keychain, args).await?,
    }

    Ok(())
}

async fn build_driver(
    settings: &Arc<Settings>,
    keychain: &KeychainAccess,
    scheduler: Arc<LocalScheduler>,
) -> Result<InvocationDriver<SweepService<GmailMailbox>, LocalScheduler>> {
    let client = http_client(settings)?;
    let mailbox = Arc::new(connect_mailbox(keychain, client.clone()).await?);
    let classifier = build_classifier(settings, keychain, client).await?;

    let mut sweep = SweepService::new(mailbox, classifier, Arc::clone(settings))
        .context("failed to set up sweep")?;
    if !settings.labels.use_scanned_label {
        sweep = sweep.with_progress(Arc::new(progress_store()?));
    }

    Ok(InvocationDriver::new(
        Arc::new(sweep),
        scheduler,
        settings.driver.clone(),
    ))
}

fn http_client(settings: &Settings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.inference.request_timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

fn progress_store() -> Result<JsonProgressStore> {
    JsonProgressStore::in_data_dir().context("no data directory available for the scan cursor")
}

async fn connect_mailbox(
    keychain: &KeychainAccess,
    client: reqwest::Client,
) -> Result<GmailMailbox> {
    let credentials = gmail_credentials(keychain).await?;
    let mailbox = GmailMailbox::new(credentials).with_client(client);
    mailbox
        .authenticate()
        .await
        .context("Gmail authentication failed")?;
    Ok(mailbox)
}

/// Environment first, then the keychain.
async fn gmail_credentials(keychain: &KeychainAccess) -> Result<GmailCredentials> {
    if let (Ok(client_id), Ok(client_secret), Ok(refresh_token)) = (
        std::env::var(GMAIL_CLIENT_ID_ENV),
        std::env::var(GMAIL_CLIENT_SECRET_ENV),
        std::env::var(GMAIL_REFRESH_TOKEN_ENV),
    ) {
        return Ok(GmailCredentials {
            refresh_token,
            client_id,
            client_secret,
        });
    }

    keychain
        .retrieve_json(KeychainAccess::GMAIL_CREDENTIALS_KEY)
        .await
        .context("failed to read Gmail credentials from keychain")?
        .with_context(|| {
            format!(
                "no Gmail credentials: set {GMAIL_CLIENT_ID_ENV}, {GMAIL_CLIENT_SECRET_ENV} and \
                 {GMAIL_REFRESH_TOKEN_ENV}, or run `rejection-sorter store-credentials`"
            )
        })
}

async fn inference_api_key(settings: &Settings, keychain: &KeychainAccess) -> Result<String> {
    let inference = &settings.inference;
    if let Ok(key) = std::env::var(&inference.api_key_env) {
        if !key.trim().is_empty() {
            return Ok(key);
        }
    }

    keychain
        .retrieve(&inference.api_key_keychain_id)
        .await
        .context("failed to read inference API key from keychain")?
        .with_context(|| {
            format!(
                "no inference API key: set {} or run `rejection-sorter store-credentials --api-key`",
                inference.api_key_env
            )
        })
}

async fn build_classifier(
    settings: &Settings,
    keychain: &KeychainAccess,
    client: reqwest::Client,
) -> Result<Arc<dyn Classifier>> {
    match settings.classifier.mode {
        ClassifierMode::Keyword => {
            tracing::info!("using keyword classifier, no inference calls will be made");
            let classifier = KeywordClassifier::from_settings(&settings.classifier)
                .context("invalid rejection phrases")?;
            Ok(Arc::new(classifier))
        }
        ClassifierMode::Llm => {
            let api_key = inference_api_key(settings, keychain).await?;
            let provider = OpenAiCompatibleProvider::custom(
                &settings.inference.base_url,
                Some(api_key),
                &settings.inference.model,
            )
            .with_client(client);
            tracing::info!(model = %settings.inference.model, "using LLM classifier");
            Ok(Arc::new(LlmClassifier::new(
                Arc::new(provider),
                settings.classifier.clone(),
                &settings.inference,
            )))
        }
    }
}

/// One-result search: succeeds only when the mailbox is reachable and not
/// quota-limited.
async fn check(settings: &Settings, keychain: &KeychainAccess) -> Result<()> {
    let mailbox = connect_mailbox(keychain, http_client(settings)?).await?;
    match mailbox.search("is:unread", Pagination::with_limit(1)).await {
        Ok(_) => {
            println!("mailbox reachable, good to run");
            Ok(())
        }
        Err(e) if e.is_transient() => bail!("still limited: {e}"),
        Err(e) => Err(e).context("mailbox check failed"),
    }
}

async fn store_credentials(
    settings: &Settings,
    keychain: &KeychainAccess,
    args: StoreCredentialsArgs,
) -> Result<()> {
    let StoreCredentialsArgs {
        client_id,
        client_secret,
        refresh_token,
        api_key,
    } = args;

    let mut stored = false;
    if let (Some(client_id), Some(client_secret), Some(refresh_token)) =
        (client_id, client_secret, refresh_token)
    {
        let credentials = GmailCredentials {
            refresh_token,
            client_id,
            client_secret,
        };
        keychain
            .store_json(KeychainAccess::GMAIL_CREDENTIALS_KEY, &credentials)
            .await
            .context("failed to store Gmail credentials")?;
        println!("stored Gmail credentials");
        stored = true;
    }

    if let Some(api_key) = api_key {
        keychain
            .store(&settings.inference.api_key_keychain_id, &api_key)
            .await
            .context("failed to store inference API key")?;
        println!("stored inference API key");
        stored = true;
    }

    if !stored {
        bail!("nothing to store: pass --client-id/--client-secret/--refresh-token and/or --api-key");
    }
    Ok(())
}
