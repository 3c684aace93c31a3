//! Corpus loading: the full member population with relations, paged out
//! of the store and re-joined with team data in memory.

use std::collections::HashMap;

use anyhow::Result;
use tracing::info;

use lattice_common::{Member, Team};

use crate::traits::MemberDirectory;

pub const DEFAULT_PAGE_SIZE: u64 = 500;

/// Load every member, `page_size` rows at a time, until a short page.
///
/// Teams are fetched once into a uid-keyed map and attached to each
/// membership here instead of per member in the store: one extra bulk
/// fetch instead of N lookups. Read-only; any store failure propagates,
/// there is no partial result or retry.
pub async fn load_corpus(directory: &dyn MemberDirectory, page_size: u64) -> Result<Vec<Member>> {
    let teams: HashMap<String, Team> = directory
        .all_teams()
        .await?
        .into_iter()
        .map(|t| (t.uid.clone(), t))
        .collect();

    let mut members = Vec::new();
    let mut offset = 0u64;
    loop {
        let page = directory.members_page(offset, page_size).await?;
        let page_len = page.len() as u64;
        members.extend(page);
        if page_len < page_size {
            break;
        }
        offset += page_size;
    }

    for member in &mut members {
        for membership in &mut member.teams {
            membership.team = teams.get(&membership.team_uid).cloned();
        }
    }

    info!(members = members.len(), teams = teams.len(), "Corpus loaded");
    Ok(members)
}
