use time::OffsetDateTime;

/// `"My Site!"` at t -> `"my-site-<unix millis>"`.
pub fn generate_bundle_id(title: &str, at: OffsetDateTime) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("bundle");
    }
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    format!("{slug}-{millis}")
}
