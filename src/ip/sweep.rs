//! Parallel ping sweep over a list of addresses.

use std::net::IpAddr;
use std::time::Instant;

use rayon::prelude::*;

use super::probe::{CancelToken, ProbeOutcome, ProbeResult, Prober};

/// Probe every target on a dedicated pool of `workers` threads.
///
/// The first [`ProbeOutcome::Failed`] cancels the rest of the sweep: a
/// broken probe (missing binary, no permission) fails for every address, so
/// there is no point in waiting for the others. Results come back sorted by
/// address.
pub fn sweep<P: Prober>(
    targets: &[IpAddr],
    prober: &P,
    workers: usize,
    cancel: &CancelToken,
) -> Result<Vec<ProbeResult>, rayon::ThreadPoolBuildError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("p3ipam-ping-{}", i))
        .build()?;

    log::info!("Sweeping {} addresses with {} workers", targets.len(), workers.max(1));

    let mut results: Vec<ProbeResult> = pool.install(|| {
        targets
            .par_iter()
            .map(|&address| {
                let started = Instant::now();
                let outcome = prober.probe(address, cancel);
                if let ProbeOutcome::Failed(reason) = &outcome {
                    if !cancel.is_cancelled() {
                        log::warn!("Probe of {} failed, cancelling sweep: {}", address, reason);
                    }
                    cancel.cancel();
                }
                ProbeResult {
                    address,
                    outcome,
                    elapsed: started.elapsed(),
                }
            })
            .collect()
    });

    results.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(results)
}

/// Outcome counts for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub alive: usize,
    pub unreachable: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl SweepSummary {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            match result.outcome {
                ProbeOutcome::Alive => summary.alive += 1,
                ProbeOutcome::Unreachable => summary.unreachable += 1,
                ProbeOutcome::Cancelled => summary.cancelled += 1,
                ProbeOutcome::Failed(_) => summary.failed += 1,
            }
            summary
        })
    }

    pub fn total(&self) -> usize {
        self.alive + self.unreachable + self.cancelled + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        alive: HashSet<IpAddr>,
        calls: AtomicUsize,
    }

    impl Prober for Scripted {
        fn probe(&self, address: IpAddr, _cancel: &CancelToken) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.alive.contains(&address) {
                ProbeOutcome::Alive
            } else {
                ProbeOutcome::Unreachable
            }
        }
    }

    struct AlwaysFails;

    impl Prober for AlwaysFails {
        fn probe(&self, _address: IpAddr, cancel: &CancelToken) -> ProbeOutcome {
            if cancel.is_cancelled() {
                ProbeOutcome::Cancelled
            } else {
                ProbeOutcome::Failed("no ping".to_string())
            }
        }
    }

    fn addresses(last_octets: &[u8]) -> Vec<IpAddr> {
        last_octets
            .iter()
            .map(|o| IpAddr::from([10, 0, 0, *o]))
            .collect()
    }

    #[test]
    fn test_sweep_probes_every_target_and_sorts() {
        let prober = Scripted {
            alive: addresses(&[3, 7]).into_iter().collect(),
            calls: AtomicUsize::new(0),
        };
        let targets = addresses(&[9, 7, 1, 3, 5]);

        let results = sweep(&targets, &prober, 4, &CancelToken::new()).unwrap();
        assert_eq!(prober.calls.load(Ordering::SeqCst), 5);

        let order: Vec<_> = results.iter().map(|r| r.address).collect();
        assert_eq!(order, addresses(&[1, 3, 5, 7, 9]));

        let summary = SweepSummary::from_results(&results);
        assert_eq!(summary.alive, 2);
        assert_eq!(summary.unreachable, 3);
        assert_eq!(summary.total(), 5);
    }

    #[test]
    fn test_failed_probe_cancels_the_sweep() {
        let cancel = CancelToken::new();
        let results = sweep(&addresses(&[1, 2, 3, 4]), &AlwaysFails, 1, &cancel).unwrap();
        assert!(cancel.is_cancelled());

        // With one worker the first probe fails and the rest see the flag.
        let summary = SweepSummary::from_results(&results);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 3);
    }

    #[test]
    fn test_empty_target_list() {
        let results = sweep(&[], &AlwaysFails, 8, &CancelToken::new()).unwrap();
        assert!(results.is_empty());
        assert_eq!(SweepSummary::from_results(&results), SweepSummary::default());
    }
}
