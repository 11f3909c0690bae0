// src/services/fgv.rs

//! Executive-education free courses (`/cursos/gratuitos?page=N`, 0-based).

use std::time::Duration;

use crate::services::area::AreaClassifier;
use crate::services::catalog::CatalogSpec;
use crate::services::extract::{ExtractionStrategy, TitleFallback};
use crate::services::RecordDefaults;

pub const NAME: &str = "fgv";
pub const DEFAULT_BASE: &str = "https://educacao-executiva.fgv.br";

const DETAIL_PREFIX: &str = "/cursos/online/";

/// Only detail routes (`/cursos/online/<area>/<slug>`) are courses.
pub fn is_detail_path(href: &str) -> bool {
    href.starts_with(DETAIL_PREFIX) && href.split('/').count() >= 5
}

pub fn spec() -> CatalogSpec {
    CatalogSpec {
        name: NAME,
        default_base: DEFAULT_BASE,
        list_path: "/cursos/gratuitos?page=",
        start_page: 0,
        alternate_start: Some(1),
        strategy: ExtractionStrategy::new([
            r#"main a[href^="/cursos/online/"]"#,
            r#"a[href^="/cursos/online/"]"#,
        ])
        .with_href_filter(is_detail_path)
        .with_title_fallback(TitleFallback::Headings { min_chars: 5 }),
        areas: AreaClassifier::executive(),
        defaults: RecordDefaults {
            provider: "FGV",
            free: true,
            status: None,
            price: None,
        },
        page_delay: Duration::from_millis(220),
    }
}
