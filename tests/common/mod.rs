// tests/common/mod.rs
//
// Shared helpers for integration tests: a loopback axum server and
// configuration tuned for fast, deterministic runs.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use course_crawler::models::Config;
use course_crawler::services::AdapterSettings;
use course_crawler::utils::retry::RetryPolicy;

/// Serve `router` on an ephemeral loopback port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

/// Request counter shared with handlers.
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration without politeness delays or retry waits.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.http.retry = RetryPolicy::immediate(0);
    config.http.timeout_ms = 5_000;
    config.scrape.page_delay_ms = Some(0);
    config.notify.batch_delay_ms = 0;
    config.pending.batch_delay_ms = 0;
    config
}

pub fn fast_settings() -> AdapterSettings {
    AdapterSettings::from_config(&fast_config())
}

/// `count` course cards linking to `/cursos/online/<area>/<prefix>-<i>`.
pub fn fgv_cards(prefix: &str, count: usize) -> String {
    let mut html = String::from("<html><body><main>");
    for i in 0..count {
        html.push_str(&format!(
            r#"<div class="card"><a href="/cursos/online/curta/{prefix}-{i}">Curso {prefix} {i}</a></div>"#
        ));
    }
    html.push_str("</main></body></html>");
    html
}
