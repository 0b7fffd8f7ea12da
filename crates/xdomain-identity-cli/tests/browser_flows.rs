//! Multi-origin flows through the scripted browser.

use serde_json::{json, Map};
use url::Url;

use xdomain_identity::TrackingConfig;
use xdomain_identity_cli::{Browser, BrowserProfile, CliError, MAX_JOURNEY_HOPS};

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[test]
fn test_journey_keeps_visitor_between_enabled_sites() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrackingConfig::demo();
    let browser = Browser::new(&config, BrowserProfile::open(dir.path()));

    let hops = browser.journey(&url("http://site-a.local:3001/"), 3).unwrap();
    assert_eq!(hops.len(), 4);

    let sites: Vec<_> = hops.iter().map(|h| h.site.as_str()).collect();
    assert_eq!(sites, ["Site A", "Site B", "Site A", "Site B"]);
    assert!(!hops[0].continued);
    assert!(hops[1..].iter().all(|h| h.continued));
    assert!(hops.iter().all(|h| h.visitor_id == hops[0].visitor_id));
    assert!(hops[1].url.contains("adobe_mc="));
}

#[test]
fn test_journey_hops_are_capped() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrackingConfig::demo();
    let browser = Browser::new(&config, BrowserProfile::open(dir.path()));

    let hops = browser.journey(&url("http://site-a.local:3001/"), usize::MAX).unwrap();
    assert_eq!(hops.len(), MAX_JOURNEY_HOPS + 1);
    assert_eq!(hops.last().unwrap().step, MAX_JOURNEY_HOPS);
}

#[test]
fn test_isolated_site_breaks_continuity() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrackingConfig::demo();
    let browser = Browser::new(&config, BrowserProfile::open(dir.path()));

    let hops = browser.journey(&url("http://site-c.local:3003/"), 1).unwrap();
    assert_eq!(hops[0].site, "Site C");
    assert_eq!(hops[1].site, "Site A");
    assert!(!hops[1].continued);
    assert!(!hops[1].url.contains("adobe_mc="));
}

#[test]
fn test_origins_keep_their_own_storage() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrackingConfig::demo();
    let browser = Browser::new(&config, BrowserProfile::open(dir.path()));

    let a = browser.visit(&url("http://site-a.local:3001/"), None, Map::new());
    let b = browser.visit(&url("http://site-b.local:3002/"), None, Map::new());
    assert_ne!(a.visitor_id, b.visitor_id);

    let again = browser.visit(&url("http://site-a.local:3001/pricing"), None, Map::new());
    assert_eq!(again.visitor_id, a.visitor_id);
    assert_eq!(again.session_id, a.session_id);
    assert_eq!(again.first_touch.unwrap().site, "Site A");
}

#[test]
fn test_new_session_keeps_visitor() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrackingConfig::demo();
    let browser = Browser::new(&config, BrowserProfile::open(dir.path()));
    let page = url("http://site-a.local:3001/");

    let first = browser.visit(&page, None, Map::new());
    assert_eq!(browser.profile().end_session().unwrap(), 1);
    let second = browser.visit(&page, None, Map::new());

    assert_eq!(first.visitor_id, second.visitor_id);
    assert_ne!(first.session_id, second.session_id);
}

#[test]
fn test_visit_reports_links_and_page_view() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrackingConfig::demo();
    let browser = Browser::new(&config, BrowserProfile::open(dir.path()));

    let extra = match json!({ "pageName": "landing" }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    let visit = browser.visit(&url("http://site-b.local:3002/"), None, extra);

    assert!(visit.cross_domain_enabled);
    assert_eq!(visit.links.len(), 3);
    assert!(!visit.links[0].marked);
    assert_eq!(visit.links[0].href.as_deref(), Some("/about"));
    let to_a = visit.links[1].href.as_deref().unwrap();
    assert!(to_a.starts_with("http://site-a.local:3001/?adobe_mc="));
    assert_eq!(visit.page_view.field("pageName"), Some(&json!("landing")));
    assert_eq!(visit.page_view.visitor_id, visit.visitor_id);
}

#[test]
fn test_click_custom_html() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrackingConfig::demo();
    let browser = Browser::new(&config, BrowserProfile::open(dir.path()));
    let html = r#"<a class="cross-domain-link" href="http://site-b.local:3002/cart?item=42#summary">Cart</a>"#;

    let report = browser
        .click(&url("http://site-a.local:3001/"), Some(html), 0)
        .unwrap();
    assert!(report.decorated);
    assert!(report
        .navigation
        .starts_with("http://site-b.local:3002/cart?item=42&adobe_mc="));
    assert!(report.navigation.ends_with("#summary"));

    let missing = browser.click(&url("http://site-a.local:3001/"), Some(html), 5);
    assert!(matches!(missing, Err(CliError::LinkNotFound(5))));
}
