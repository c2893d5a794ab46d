//! Line parser shared by every remote source format and by Final itself.
//!
//! Handles plain domain-per-line lists, wildcard lists (`*.example.com`)
//! and hosts-file syntax (`0.0.0.0 example.com # note`).

use crate::domain::Domain;
use std::net::IpAddr;

/// Addresses that mark a hosts-file line as a null route.
const NULL_ROUTES: [&str; 3] = ["0.0.0.0", "127.0.0.1", "::"];

/// Names hosts files carry for the local machine; never block these.
const RESERVED: [&str; 6] = [
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
];

pub fn parse_line(line: &str) -> Option<Domain> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return None;
    }

    let line = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };

    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    let token = if NULL_ROUTES.contains(&first) {
        tokens.next()?
    } else if is_ip(first) {
        // A hosts mapping to a real address is not a block entry.
        return None;
    } else {
        first
    };
    if is_ip(token) {
        return None;
    }
    let token = token.strip_prefix("*.").unwrap_or(token);

    let domain = Domain::parse(token)?;
    if RESERVED.contains(&domain.as_str()) {
        return None;
    }
    Some(domain)
}

fn is_ip(token: &str) -> bool {
    token.parse::<IpAddr>().is_ok()
}
