pub const MAX_INDEX_CONCURRENCY: usize = 32;

pub const INDEX_CONCURRENCY_ENV: &str = "CONTEXT_ENGINE_INDEX_CONCURRENCY";

/// Half the available cores, at least one, at most eight.
#[must_use]
pub fn default_index_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    (cpus / 2).clamp(1, 8)
}

#[must_use]
pub fn parse_index_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_INDEX_CONCURRENCY)
}
