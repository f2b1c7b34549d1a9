mod api;
mod app;
mod client;
mod config;
mod error;
mod event;
mod remote;
mod session;
mod theme;
mod ui;

use api::ApiClient;
use app::CaseBriefApp;
use client::CaseBriefClient;
use config::ClientConfig;
use eframe::egui;
use event::EventSink;
use remote::firebase_auth::FirebaseAuth;
use remote::firestore::FirestoreStore;
use session::persist;
use std::sync::{mpsc, Arc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "casebrief=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn restore_session(runtime: &tokio::runtime::Runtime, auth: &Arc<FirebaseAuth>) {
    let path = persist::default_path();
    let (saved, warning) = persist::load(&path);
    if let Some(warning) = warning {
        tracing::warn!("ignoring saved session: {warning}");
    }
    let Some(saved) = saved else {
        return;
    };

    let auth = Arc::clone(auth);
    runtime.spawn(async move {
        match auth.restore(saved).await {
            Ok(identity) => tracing::info!(uid = %identity.uid, "session restored"),
            Err(err) => {
                tracing::warn!("saved session could not be restored: {err}");
                if let Err(err) = persist::clear(&path) {
                    tracing::warn!("failed to remove saved session: {err}");
                }
            }
        }
    });
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ClientConfig::from_env()?;
    tracing::info!(api_base = %config.api_base, project = %config.firebase.project_id, "starting CaseBrief");
    let (tx, rx) = mpsc::channel();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("casebrief-runtime")
        .build()?;

    let auth = Arc::new(
        FirebaseAuth::new(config.firebase.clone()).with_session_path(persist::default_path()),
    );
    let documents = Arc::new(FirestoreStore::new(
        &config.firebase,
        auth.clone(),
        config.poll_interval,
    ));
    let gateway = Arc::new(ApiClient::new(config.api_base.clone()));

    let client = runtime.block_on(async {
        CaseBriefClient::new(
            EventSink::new(tx),
            auth.clone(),
            documents,
            gateway,
            config.export_dir(),
        )
    })?;
    client.start();
    restore_session(&runtime, &auth);
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "CaseBrief AI",
        native_options,
        Box::new(move |creation_context| {
            Ok(Box::new(CaseBriefApp::new(
                rx,
                client,
                &creation_context.egui_ctx,
            )))
        }),
    )?;

    Ok(())
}
