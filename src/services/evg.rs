// src/services/evg.rs

//! Government virtual school catalog (`/catalogo?page=N`, usually 1-based).

use std::time::Duration;

use crate::services::area::AreaClassifier;
use crate::services::catalog::CatalogSpec;
use crate::services::extract::ExtractionStrategy;
use crate::services::RecordDefaults;

pub const NAME: &str = "evg";
pub const DEFAULT_BASE: &str = "https://www.escolavirtual.gov.br";

pub fn spec() -> CatalogSpec {
    CatalogSpec {
        name: NAME,
        default_base: DEFAULT_BASE,
        list_path: "/catalogo?page=",
        start_page: 1,
        alternate_start: Some(0),
        strategy: ExtractionStrategy::new([
            ".resultado-cursos .card, article.card, .card",
            r#"a[href*="/curso/"]"#,
        ]),
        areas: AreaClassifier::standard(),
        defaults: RecordDefaults {
            provider: "EVG",
            free: true,
            status: Some("Online (EAD)"),
            price: None,
        },
        page_delay: Duration::from_millis(180),
    }
}
