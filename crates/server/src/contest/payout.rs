//! Prize pool distribution.

use ahash::AHashMap;

use diceroyale_core::identity::PlayerId;
use diceroyale_core::money::Coins;

use super::ranking::RankedEntry;

// Prize tiers in percent of the distributable pool, by contestant count.
// The percentage no tier covers is retained by the house on top of the
// commission; observed product policy, preserved as-is.
const TIERS_SMALL: &[u32] = &[100,];
const TIERS_FOUR: &[u32] = &[70, 20,];
const TIERS_FIELD: &[u32] = &[60, 20, 10,];

/// The pool remaining after the house commission, rounded down to whole
/// coins.
#[must_use]
pub fn distributable_pool(total_pool: Coins, commission_rate: f64,) -> Coins {
    let kept = f64::from(total_pool.amount(),) * (1.0 - commission_rate);
    Coins::new(kept.floor() as u32,)
}

fn tiers_for(count: usize,) -> &'static [u32] {
    match count {
        | 0..=3 => TIERS_SMALL,
        | 4 => TIERS_FOUR,
        | _ => TIERS_FIELD,
    }
}

/// Splits the commission-adjusted pool across ranked finishers.
///
/// A rank group spanning several tier positions takes their summed slice,
/// divided evenly across the group; an indivisible remainder coin goes to
/// the group's first member so the paid total never drifts from the tier
/// slice. Contestants below every tier receive zero.
#[must_use]
pub fn distribute(
    entries: &[RankedEntry], total_pool: Coins, commission_rate: f64,
) -> AHashMap<PlayerId, Coins,> {
    let pool = distributable_pool(total_pool, commission_rate,);
    let tiers = tiers_for(entries.len(),);

    let mut payouts: AHashMap<PlayerId, Coins,> = entries
        .iter()
        .map(|entry| (entry.identity.id.clone(), Coins::ZERO,),)
        .collect();

    let mut start = 0;
    while start < entries.len() {
        let mut end = start + 1;
        while end < entries.len() && entries[end].rank == entries[start].rank
        {
            end += 1;
        }
        let group = &entries[start..end];

        let percent: u32 = (start..end)
            .filter_map(|position| tiers.get(position,),)
            .sum();
        if percent > 0 {
            let slice =
                u64::from(pool.amount(),) * u64::from(percent,) / 100;
            let members = group.len() as u64;
            let share = slice / members;
            let extra = slice % members;
            for (offset, entry,) in group.iter().enumerate() {
                let amount = share
                    + if offset == 0 {
                        extra
                    } else {
                        0
                    };
                payouts.insert(
                    entry.identity.id.clone(),
                    Coins::new(amount as u32,),
                );
            }
        }
        start = end;
    }

    payouts
}
