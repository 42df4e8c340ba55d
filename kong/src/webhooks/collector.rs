use std::collections::BTreeMap;
use std::future::Future;

use ethers::types::Address;
use tracing::{debug, warn};

use super::Subscription;
use crate::context::Context;
use crate::jobs::{Job, WebhookTarget};
use crate::provider::BlockRef;
use crate::sources::Source;
use crate::{ChainId, JobError};

/// Groups one fanout pass's sources under the subscriptions that want them,
/// one batch per `(subscription, chain)`.
pub struct WebhookCollector {
    subscriptions: Vec<Subscription>,
    batches: BTreeMap<(usize, ChainId), Vec<Address>>,
}

impl WebhookCollector {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self {
            subscriptions,
            batches: BTreeMap::new(),
        }
    }

    pub fn collect(&mut self, source: &Source) {
        for (index, subscription) in self.subscriptions.iter().enumerate() {
            if !subscription.matches(source) {
                continue;
            }

            let targets = self.batches.entry((index, source.chain_id)).or_default();
            if !targets.contains(&source.address) {
                targets.push(source.address);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Empties the collector into `extract.webhook` jobs, reading each
    /// chain's head once. Batches of a chain whose head cannot be read are
    /// dropped for this pass.
    pub async fn flush(&mut self, ctx: &Context) -> Vec<Job> {
        self.flush_with(|chain_id| ctx.head(chain_id)).await
    }

    pub async fn flush_with<F, Fut>(&mut self, mut head: F) -> Vec<Job>
    where
        F: FnMut(ChainId) -> Fut,
        Fut: Future<Output = Result<BlockRef, JobError>>,
    {
        let batches = std::mem::take(&mut self.batches);

        let mut heads: BTreeMap<ChainId, BlockRef> = BTreeMap::new();
        let mut unreachable: Vec<ChainId> = vec![];
        for (_, chain_id) in batches.keys() {
            if heads.contains_key(chain_id) || unreachable.contains(chain_id) {
                continue;
            }

            match head(*chain_id).await {
                Ok(block) => {
                    heads.insert(*chain_id, block);
                }
                Err(error) => {
                    warn!(chain_id, %error, "No head, skipping webhook batches");
                    unreachable.push(*chain_id);
                }
            }
        }

        let mut jobs = Vec::with_capacity(batches.len());
        for ((index, chain_id), targets) in batches {
            let (Some(subscription), Some(block)) = (self.subscriptions.get(index), heads.get(&chain_id))
            else {
                continue;
            };

            debug!(
                subscription = %subscription.id,
                chain_id,
                targets = targets.len(),
                "Flushing webhook batch"
            );

            jobs.push(Job::ExtractWebhook(WebhookTarget {
                abi_path: subscription.abi_path.clone(),
                chain_id,
                block_number: block.number,
                block_time: block.timestamp,
                subscription: subscription.clone(),
                targets,
            }));
        }

        jobs
    }
}
