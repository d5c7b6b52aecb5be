/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Ordering of the "ranked" app view.

use std::collections::HashSet;

use appshelf_core::{AppDescriptor, AppId};

use crate::persistence::PersistedAppUsage;

pub const DEFAULT_MAX_RANKED: usize = 5;

pub struct RankingInput<'a> {
    /// Aggregated list, already in display order.
    pub all: &'a [AppDescriptor],
    pub pinned: &'a [AppDescriptor],
    pub usage: &'a PersistedAppUsage,
}

pub trait RankingStrategy: Send + Sync {
    fn rank(&self, input: RankingInput<'_>) -> Vec<AppDescriptor>;
}

/// Most-opened apps first, then pinned apps that were never opened.
///
/// Among apps with equal open counts pinned ones come first; remaining ties
/// keep the display order of `all`.
#[derive(Debug, Clone)]
pub struct UsageRanking {
    max_ranked: usize,
}

impl UsageRanking {
    pub fn new(max_ranked: usize) -> Self {
        Self { max_ranked }
    }
}

impl Default for UsageRanking {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RANKED)
    }
}

impl RankingStrategy for UsageRanking {
    fn rank(&self, input: RankingInput<'_>) -> Vec<AppDescriptor> {
        let pinned_ids = input.pinned.iter().map(|app| app.id).collect::<HashSet<_>>();

        let mut opened = input
            .all
            .iter()
            .map(|app| (app, input.usage.open_count(&app.id)))
            .filter(|(_, count)| *count > 0)
            .collect::<Vec<_>>();
        opened.sort_by(|(a, a_count), (b, b_count)| {
            b_count
                .cmp(a_count)
                .then_with(|| pinned_ids.contains(&b.id).cmp(&pinned_ids.contains(&a.id)))
        });

        let mut seen = HashSet::<AppId>::new();
        opened
            .into_iter()
            .map(|(app, _)| app)
            .chain(input.pinned.iter())
            .filter(|app| seen.insert(app.id))
            .take(self.max_ranked)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn remote(id: u64, name: &str) -> AppDescriptor {
        AppDescriptor {
            id: AppId::Catalog(id),
            name: name.to_string(),
            url: format!("https://{id}.example"),
            icon_url: String::new(),
            description: String::new(),
            chain_ids: Vec::new(),
            tags: Vec::new(),
        }
    }

    fn usage(opens: &[(u64, u64)]) -> PersistedAppUsage {
        let mut usage = PersistedAppUsage::default();
        for (id, count) in opens {
            for _ in 0..*count {
                usage.record_open(AppId::Catalog(*id), 0);
            }
        }
        usage
    }

    fn ranked_ids(opens: &[(u64, u64)], pinned: &[u64], max: usize) -> Vec<u64> {
        let all = (1..=6)
            .map(|id| remote(id, &format!("App {id}")))
            .collect::<Vec<_>>();
        let pinned = all
            .iter()
            .filter(|app| pinned.iter().any(|id| app.id == AppId::Catalog(*id)))
            .cloned()
            .collect::<Vec<_>>();
        let usage = usage(opens);
        UsageRanking::new(max)
            .rank(RankingInput {
                all: &all,
                pinned: &pinned,
                usage: &usage,
            })
            .into_iter()
            .map(|app| match app.id {
                AppId::Catalog(id) => id,
                AppId::Custom(_) => 0,
            })
            .collect()
    }

    #[rstest]
    #[case::nothing_recorded(&[], &[], 5, vec![])]
    #[case::pinned_only(&[], &[4, 2], 5, vec![2, 4])]
    #[case::most_opened_first(&[(3, 1), (5, 4)], &[], 5, vec![5, 3])]
    #[case::pinned_wins_ties(&[(3, 2), (5, 2)], &[5], 5, vec![5, 3])]
    #[case::opened_pinned_not_repeated(&[(2, 1)], &[2, 6], 5, vec![2, 6])]
    #[case::capped(&[(1, 1), (2, 1), (3, 1)], &[4], 2, vec![1, 2])]
    fn usage_ranking_orders_apps(
        #[case] opens: &[(u64, u64)],
        #[case] pinned: &[u64],
        #[case] max: usize,
        #[case] expected: Vec<u64>,
    ) {
        assert_eq!(ranked_ids(opens, pinned, max), expected);
    }
}
