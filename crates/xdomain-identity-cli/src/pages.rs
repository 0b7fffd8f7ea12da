//! Built-in demo pages, one per configured site.

use xdomain_identity::TrackingConfig;

/// HTML for the page served at `host`: an internal link plus a marked link
/// to every other configured site.
pub fn demo_page(config: &TrackingConfig, host: &str) -> String {
    let title = config
        .sites
        .iter()
        .find(|s| s.domain == host)
        .map(|s| s.name.as_str())
        .unwrap_or(host);

    let mut links = String::new();
    links.push_str("      <li><a href=\"/about\">About</a></li>\n");
    for site in config.sites.iter().filter(|s| s.domain != host) {
        links.push_str(&format!(
            "      <li><a class=\"{marker}\" href=\"http://{domain}/\" data-target-domain=\"{domain}\">{name}</a></li>\n",
            marker = config.marker_class(),
            domain = escape(&site.domain),
            name = escape(&site.name),
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n  <h1>{title}</h1>\n  <nav>\n    <ul>\n{links}    </ul>\n  </nav>\n</body>\n</html>\n",
        title = escape(title),
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
