//! Nickname disambiguation.
//!
//! A requested name `X` becomes the first free name among `X`, `X(1)`,
//! `X(2)`, ... Suffixed candidates cut `X` short so they never exceed
//! `MAX_NICKNAME_LEN`.

use hashbrown::HashSet;

use crate::constants::net::MAX_NICKNAME_LEN;
use crate::util::Pid;

/// Disambiguate `requested` against the nicknames in `others`
pub fn disambiguate<'a, I>(requested: &str, others: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let base = requested.trim_end();
    let taken: HashSet<&str> = others.into_iter().collect();

    // suffixed candidates are pairwise distinct, so a free one exists
    // within `taken.len() + 1` steps
    (0..)
        .map(|n| candidate(base, n))
        .find(|name| !taken.contains(name.as_str()))
        .unwrap_or_else(|| base.to_string())
}

/// Name at index `n`: the bare base for 0, otherwise `base(n)` with the
/// base cut to leave room for the suffix
fn candidate(base: &str, n: Pid) -> String {
    if n == 0 {
        return base.to_string();
    }
    let suffix = format!("({})", n);
    let room = MAX_NICKNAME_LEN.saturating_sub(suffix.len());
    let stem: String = base.chars().take(room).collect();
    stem + &suffix
}
