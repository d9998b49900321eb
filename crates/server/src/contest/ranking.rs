//! Leaderboard ranking and tie-break resolution.
//!
//! Total score decides first, descending. Ties fall back to the per-round
//! chain: the higher score in the earliest differing round wins. A fully
//! identical chain is not broken; such entries share a rank and the next
//! rank number skips the group.

use std::cmp::Ordering;

use diceroyale_core::event::LeaderboardRow;
use diceroyale_core::identity::PlayerIdentity;

/// Sentinel for a round with no recorded value: worse than any real score.
const MISSING_ROUND: i64 = -1;

/// One contestant's derived rank. Never stored; recomputed from scores.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct RankedEntry {
    /// Who this entry ranks.
    pub identity:        PlayerIdentity,
    /// Sum of recorded round scores.
    pub total_score:     u32,
    /// The tie-break chain, round order.
    pub per_round_score: Vec<u32,>,
    /// Competition rank; ties share, the next rank skips the group.
    pub rank:            usize,
    /// Round index that decided this entry's order against an
    /// equal-total neighbour, when one did.
    pub tie_broken_by:   Option<usize,>,
}

impl RankedEntry {
    /// An unranked entry; [`rank`] fills in rank and tie-break data.
    #[must_use]
    pub fn new(
        identity: PlayerIdentity, total_score: u32,
        per_round_score: Vec<u32,>,
    ) -> Self {
        Self {
            identity,
            total_score,
            per_round_score,
            rank: 0,
            tie_broken_by: None,
        }
    }
}

fn round_score(scores: &[u32], index: usize,) -> i64 {
    scores.get(index,).map_or(MISSING_ROUND, |&s| i64::from(s,),)
}

/// Total order used for ranking: `Less` means `a` finishes above `b`.
fn compare(a: &RankedEntry, b: &RankedEntry,) -> Ordering {
    b.total_score.cmp(&a.total_score,).then_with(|| {
        let rounds = a.per_round_score.len().max(b.per_round_score.len(),);
        for index in 0..rounds {
            let ord = round_score(&b.per_round_score, index,)
                .cmp(&round_score(&a.per_round_score, index,),);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    },)
}

fn first_differing_round(
    a: &RankedEntry, b: &RankedEntry,
) -> Option<usize,> {
    let rounds = a.per_round_score.len().max(b.per_round_score.len(),);
    (0..rounds).find(|&index| {
        round_score(&a.per_round_score, index,)
            != round_score(&b.per_round_score, index,)
    },)
}

/// Produces the total-order leaderboard with competition ranks.
#[must_use]
pub fn rank(mut entries: Vec<RankedEntry,>,) -> Vec<RankedEntry,> {
    entries.sort_by(|a, b| compare(a, b,),);

    let mut start = 0;
    while start < entries.len() {
        let mut end = start + 1;
        while end < entries.len()
            && compare(&entries[start], &entries[end],) == Ordering::Equal
        {
            end += 1;
        }
        for entry in &mut entries[start..end] {
            entry.rank = start + 1;
        }
        start = end;
    }

    // Mark entries whose order against an equal-total neighbour came from
    // the round chain rather than the total alone.
    for index in 1..entries.len() {
        let (left, right,) = entries.split_at_mut(index,);
        let prev = &mut left[index - 1];
        let cur = &mut right[0];
        if prev.total_score == cur.total_score && prev.rank != cur.rank {
            if let Some(round,) = first_differing_round(prev, cur,) {
                prev.tie_broken_by.get_or_insert(round,);
                cur.tie_broken_by.get_or_insert(round,);
            }
        }
    }

    entries
}

/// Explanation for the first group where tie-breaking changed the order,
/// if any tie was broken at all.
#[must_use]
pub fn tie_break_note(entries: &[RankedEntry],) -> Option<String,> {
    entries.iter().find_map(|entry| {
        entry.tie_broken_by.map(|round| {
            format!(
                "tie at {} points resolved by the round {} score",
                entry.total_score,
                round + 1
            )
        },)
    },)
}

/// The first `limit` leaderboard rows of a ranked list.
#[must_use]
pub fn top_rows(
    entries: &[RankedEntry], limit: usize,
) -> Vec<LeaderboardRow,> {
    entries
        .iter()
        .take(limit,)
        .map(|entry| LeaderboardRow {
            player_id: entry.identity.id.clone(),
            display_name: entry.identity.display_name.clone(),
            total_score: entry.total_score,
            rank: entry.rank,
        },)
        .collect()
}
