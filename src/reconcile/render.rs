//! Final artifact rendering. The resolver reads this file verbatim, so the
//! layout here is a compatibility contract.

use crate::domain::Domain;

pub const HEADER_PREFIX: &str = "# Updated: ";
pub const LOCALHOST_DIRECTIVES: &str = "127.0.0.1 localhost\n::1 localhost\n";

/// Everything after the header line: localhost directives, then one IPv4
/// and one IPv6 null-route per domain. `domains` must already be sorted.
pub fn render_body<'a, I>(domains: I) -> String
where
    I: IntoIterator<Item = &'a Domain>,
{
    let mut out = String::from(LOCALHOST_DIRECTIVES);
    for domain in domains {
        out.push_str("0.0.0.0 ");
        out.push_str(domain.as_str());
        out.push('\n');
        out.push_str(":: ");
        out.push_str(domain.as_str());
        out.push('\n');
    }
    out
}

pub fn render_final(timestamp: &str, body: &str) -> String {
    format!("{HEADER_PREFIX}{timestamp}\n{body}")
}

/// The body of an existing artifact, i.e. the content below its header.
pub fn existing_body(contents: &str) -> &str {
    if contents.starts_with(HEADER_PREFIX) {
        match contents.find('\n') {
            Some(idx) => &contents[idx + 1..],
            None => "",
        }
    } else {
        contents
    }
}

pub fn timestamp_now() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_render_layout() {
        let domains: BTreeSet<Domain> = ["b.com", "a.com"]
            .iter()
            .map(|s| Domain::parse(s).unwrap())
            .collect();

        let rendered = render_final("2024-05-01 10:00:00.000000", &render_body(&domains));
        assert_eq!(
            rendered,
            "# Updated: 2024-05-01 10:00:00.000000\n\
             127.0.0.1 localhost\n\
             ::1 localhost\n\
             0.0.0.0 a.com\n\
             :: a.com\n\
             0.0.0.0 b.com\n\
             :: b.com\n"
        );
    }

    #[test]
    fn test_existing_body_strips_header_only() {
        let body = render_body(std::iter::empty());
        let full = render_final("then", &body);
        assert_eq!(existing_body(&full), body);
        assert_eq!(existing_body("0.0.0.0 a.com\n"), "0.0.0.0 a.com\n");
    }
}
