//! VCR — the voice call router. Assigns incoming telephony calls to worker
//! pods out of tiered pools held in a shared key-value store, returns their
//! capacity on release, and (on the elected leader) runs the control loops
//! that keep the pools honest against the actual fleet.

#[macro_use]
extern crate rocket;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate log;

pub mod allocator;
pub mod api;
pub mod drainer;
pub mod env;
pub mod manager;
pub mod merchants;
pub mod metrics;
pub mod pools;
pub mod releaser;
pub mod tiers;
pub mod wsurl;

use std::time::Duration;
use store::Store;
use tokio_util::sync::CancellationToken;

lazy_static! {
    static ref STORE: Store = Store::connect(
        &env::store_url(),
        env::store_pool_size(),
        env::store_dial_timeout(),
    )
    .expect("the store connection pool could not be constructed, aborting boot");
}

/// A cheap clone of the shared store handle.
pub fn store() -> Store {
    STORE.clone()
}

#[tokio::main]
async fn main() {
    // Sets the logger to use terminal colors.
    std::env::set_var("RUST_LOG_STYLE", "always");
    env_logger::init();

    let store = store();

    // The store being down at boot is fatal — a router that cannot reach
    // its pools has nothing to offer. Retry a little first; rollouts often
    // race the store's own restart.
    let mut attempt = 0;
    loop {
        match store.ping().await {
            Ok(()) => break,
            Err(err) if attempt < env::store_boot_retries() => {
                attempt += 1;
                warn!(
                    "Store ping failed ({}), retry {} of {}",
                    err,
                    attempt,
                    env::store_boot_retries()
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(err) => {
                error!("The store is unreachable at startup: {}", err);
                std::process::exit(2);
            }
        }
    }

    if let Err(err) = tiers::bootstrap(&store).await {
        error!("Tier table bootstrap failed: {}", err);
        std::process::exit(2);
    }

    let root = CancellationToken::new();
    let mut background = Vec::new();
    background.push(tokio::spawn(tiers::refresher(
        store.clone(),
        root.child_token(),
    )));
    background.push(tokio::spawn(store_watchdog(
        store.clone(),
        root.child_token(),
    )));

    match fleet::client::raw().await {
        Ok(client) => {
            if env::leader_election_enabled() {
                background.push(tokio::spawn(manager::elect(
                    client,
                    store.clone(),
                    root.clone(),
                )));
            } else {
                warn!("Leader election is disabled; this replica runs every control loop");
                let api = fleet::client::namespaced(client, &env::fleet_namespace());
                manager::start_workers(
                    &store,
                    &api,
                    &env::fleet_label_selector(),
                    root.child_token(),
                );
            }
        }
        Err(err) if env::leader_election_enabled() => {
            error!(
                "Leader election is enabled but the fleet client could not be built: {}",
                err
            );
            std::process::exit(2);
        }
        Err(err) => {
            warn!(
                "No fleet client available ({}); running the request path only",
                err
            );
        }
    }

    let mut config = rocket::Config::default();
    // If you leave it to the default then it will choose 127.0.0.1 which
    // will not be reachable when running in a container. So please leave
    // this on 0.0.0.0.
    config.address = "0.0.0.0".parse().unwrap();
    config.port = env::http_port();
    let rocket = rocket::custom(config)
        .mount(
            "/api/v1",
            routes![
                api::allocate::allocate,
                api::release::release,
                api::drain::drain,
                api::telephony::twilio,
                api::telephony::plivo,
                api::telephony::exotel,
                api::status::status,
                api::status::pod,
                api::status::health,
                api::status::ready,
                api::status::metrics_exposition,
            ],
        )
        .register(
            "/",
            catchers![
                api::bad_request,
                api::unprocessable,
                api::not_found,
                api::internal
            ],
        )
        .attach(api::RequestStamp)
        .ignite()
        .await
        .expect("the HTTP surface failed to ignite");

    // Bridge the root token into rocket's own shutdown machinery so that a
    // leadership demotion takes the HTTP surface down with it.
    let shutdown = rocket.shutdown();
    {
        let root = root.clone();
        tokio::spawn(async move {
            root.cancelled().await;
            shutdown.notify();
        });
    }

    if let Err(err) = rocket.launch().await {
        error!("The HTTP surface exited with an error: {}", err);
    }

    // A signal or a demotion got us here. Give the background workers the
    // shutdown deadline to wind down, then leave regardless.
    root.cancel();
    if tokio::time::timeout(
        env::shutdown_deadline(),
        futures::future::join_all(background),
    )
    .await
    .is_err()
    {
        warn!("Background workers did not finish within the shutdown deadline");
    }
    info!("Shutdown complete");
}

/// A small watchdog that keeps the store health gauge honest. The readiness
/// endpoint pings on demand; this covers the stretches when nobody is
/// asking.
async fn store_watchdog(store: Store, token: CancellationToken) {
    let mut tick = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => match store.ping().await {
                Ok(()) => metrics::STORE_UP.set(1),
                Err(err) => {
                    metrics::STORE_UP.set(0);
                    warn!("Store health probe failed: {}", err);
                }
            }
        }
    }
}
