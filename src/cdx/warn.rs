fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub collection: &'a str,
    pub domain: &'a str,
    pub reason: &'a str,
}

pub fn render(event: &WarnEvent<'_>) -> String {
    format!(
        "CDXSUM_WARN code={} stage={} collection={} domain={} reason={}",
        sanitize_value(event.code),
        sanitize_value(event.stage),
        sanitize_value(event.collection),
        sanitize_value(event.domain),
        sanitize_value(event.reason),
    )
}

pub fn emit(event: &WarnEvent<'_>) {
    log::warn!("{}", render(event));
}
