use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info};

use crate::context::Context;
use crate::jobs::{ComputeTarget, EvmLogsTarget, Job, SnapshotTarget, VaultTarget};
use crate::outputs::{floor_day, SECONDS_PER_DAY};
use crate::sources::{AbiKind, Source};
use crate::strides;
use crate::webhooks::WebhookCollector;
use crate::JobError;

/// Static sources plus things discovered under each abi's labels, limited to
/// configured chains. The first occurrence of a source wins.
pub async fn sources(ctx: &Context) -> Result<Vec<Source>, JobError> {
    let chain_ids = ctx.config.chain_ids();
    let mut seen = HashSet::new();
    let mut sources = vec![];

    for abi in &ctx.config.abis {
        let mut candidates: Vec<Source> = abi
            .static_sources()
            .into_iter()
            .filter(|source| chain_ids.contains(&source.chain_id))
            .collect();

        for label in &abi.things {
            let things = ctx.repo.load_things(label, &chain_ids).await?;
            candidates.extend(things.iter().map(|thing| Source::from_thing(thing, &abi.abi_path)));
        }

        for source in candidates {
            if seen.insert((source.chain_id, source.address, source.abi_path.clone())) {
                sources.push(source);
            }
        }
    }

    Ok(sources)
}

pub async fn abis(ctx: &Context) -> Result<(), JobError> {
    let sources = sources(ctx).await?;
    let mut webhooks = WebhookCollector::new(ctx.config.webhooks.clone());
    let mut jobs = Vec::with_capacity(sources.len() * 3);

    for source in &sources {
        jobs.push(Job::FanoutEvents(source.clone()));
        jobs.push(Job::ExtractSnapshot(SnapshotTarget {
            chain_id: source.chain_id,
            address: source.address,
            abi_path: source.abi_path.clone(),
        }));
        jobs.push(Job::FanoutTimeseries(source.clone()));

        if ctx
            .config
            .abi(&source.abi_path)
            .is_some_and(|abi| abi.kind == AbiKind::Vault)
        {
            jobs.push(Job::ExtractVault(VaultTarget {
                chain_id: source.chain_id,
                address: source.address,
            }));
        }

        webhooks.collect(source);
    }

    info!(sources = sources.len(), jobs = jobs.len(), "Fanning out abis");

    ctx.enqueue_all(jobs).await?;

    // an unreachable chain must not hold back the other chains' sources
    let webhook_jobs = webhooks.flush(ctx).await;
    if !webhook_jobs.is_empty() {
        ctx.enqueue_all(webhook_jobs).await?;
    }

    Ok(())
}

/// Plans the unscanned gaps between the source's incept block and the head
pub async fn events(ctx: &Context, source: &Source) -> Result<(), JobError> {
    let Some(decoder) = ctx.decoders.get(&source.abi_path) else {
        debug!(abi_path = %source.abi_path, "No decoder, no events");
        return Ok(());
    };

    let events = decoder.events();
    if events.is_empty() {
        return Ok(());
    }

    let head = ctx.head(source.chain_id).await?;
    let covered = ctx.repo.load_strides(source.chain_id, source.address).await?;
    let chunks = strides::plan(source.incept_block, head.number, &covered, ctx.config.log_stride);

    debug!(
        chain_id = source.chain_id,
        address = ?source.address,
        head = head.number,
        chunks = chunks.len(),
        "Fanning out events"
    );

    let jobs = chunks
        .into_iter()
        .map(|chunk| {
            Job::ExtractEvmLogs(EvmLogsTarget {
                chain_id: source.chain_id,
                address: source.address,
                events: events.clone(),
                from: chunk.from,
                to: chunk.to,
                handler: source.abi_path.clone(),
            })
        })
        .collect();

    ctx.enqueue_all(jobs).await?;

    Ok(())
}

pub async fn timeseries(ctx: &Context, source: &Source) -> Result<(), JobError> {
    let Some(abi) = ctx.config.abi(&source.abi_path) else {
        return Ok(());
    };

    let now = Utc::now().timestamp().max(0) as u64;
    let mut jobs = vec![];

    for kind in &abi.timeseries {
        let latest = ctx
            .repo
            .load_latest_series_time(source.chain_id, source.address, kind.label())
            .await?;

        let times = series_times(latest, source.incept_time, now, ctx.config.timeseries_window_days);
        jobs.extend(times.into_iter().map(|time| {
            kind.job(ComputeTarget {
                chain_id: source.chain_id,
                address: source.address,
                time,
            })
        }));
    }

    ctx.enqueue_all(jobs).await?;

    Ok(())
}

/// Day buckets still to compute: from the day after `latest` (or the incept
/// day) through today, never reaching back more than `window_days`
pub fn series_times(latest: Option<u64>, incept_time: u64, now: u64, window_days: u64) -> Vec<u64> {
    if window_days == 0 {
        return vec![];
    }

    let today = floor_day(now);
    let window_start = today.saturating_sub((window_days - 1) * SECONDS_PER_DAY);
    let start = match latest {
        Some(latest) => floor_day(latest) + SECONDS_PER_DAY,
        None => floor_day(incept_time),
    }
    .max(window_start);

    (start..=today).step_by(SECONDS_PER_DAY as usize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = SECONDS_PER_DAY;
    const TODAY: u64 = 19_860 * DAY;

    #[test]
    fn backfills_at_most_the_window() {
        let times = series_times(None, 0, TODAY + 3_600, 7);

        assert_eq!(times.len(), 7);
        assert_eq!(times.first(), Some(&(TODAY - 6 * DAY)));
        assert_eq!(times.last(), Some(&TODAY));
    }

    #[test]
    fn starts_at_incept_day_for_young_sources() {
        let times = series_times(None, TODAY - 2 * DAY + 500, TODAY + 1, 7);

        assert_eq!(times, vec![TODAY - 2 * DAY, TODAY - DAY, TODAY]);
    }

    #[test]
    fn resumes_after_the_latest_point() {
        assert_eq!(series_times(Some(TODAY - DAY), 0, TODAY + 1, 7), vec![TODAY]);
        assert!(series_times(Some(TODAY), 0, TODAY + 1, 7).is_empty());
        assert!(series_times(None, 0, TODAY, 0).is_empty());
    }
}
