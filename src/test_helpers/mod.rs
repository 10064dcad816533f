//! Host-test doubles for the external collaborators.

use crate::phy::{JobHandle, RadioScheduler, RssiJob, RxJob, TxJob};

/// Records every job the MAC submits; retraction removes the job again so
/// tests can assert on the currently scheduled set.
#[derive(Default)]
pub struct FakeScheduler {
    pub tx_jobs: Vec<TxJob>,
    pub rx_jobs: Vec<RxJob>,
    pub rssi_jobs: Vec<RssiJob>,
    pub retracted: Vec<JobHandle>,
    pub payload_updates: Vec<(JobHandle, Vec<u8>)>,
    /// Make the next submissions fail, per job kind.
    pub reject_tx: bool,
    pub reject_rx: bool,
    pub reject_rssi: bool,
}

impl FakeScheduler {
    pub fn scheduled_handles(&self) -> Vec<JobHandle> {
        let mut handles: Vec<JobHandle> = self
            .tx_jobs
            .iter()
            .map(|job| job.handle)
            .chain(self.rx_jobs.iter().map(|job| job.handle))
            .chain(self.rssi_jobs.iter().map(|job| job.handle))
            .collect();
        handles.sort();
        handles
    }

    /// The most recently submitted TX job with this handle. One-shot jobs
    /// are resubmitted under the same handle, so the last one wins.
    pub fn tx_job(&self, handle: JobHandle) -> Option<&TxJob> {
        self.tx_jobs.iter().rev().find(|job| job.handle == handle)
    }
}

impl RadioScheduler for FakeScheduler {
    fn submit_tx(&mut self, job: TxJob) -> bool {
        if self.reject_tx {
            return false;
        }
        self.tx_jobs.push(job);
        true
    }

    fn submit_rx(&mut self, job: RxJob) -> bool {
        if self.reject_rx {
            return false;
        }
        self.rx_jobs.push(job);
        true
    }

    fn submit_rssi(&mut self, job: RssiJob) -> bool {
        if self.reject_rssi {
            return false;
        }
        self.rssi_jobs.push(job);
        true
    }

    fn retract(&mut self, handle: JobHandle) {
        self.tx_jobs.retain(|job| job.handle != handle);
        self.rx_jobs.retain(|job| job.handle != handle);
        self.rssi_jobs.retain(|job| job.handle != handle);
        self.retracted.push(handle);
    }

    fn retract_range(&mut self, first: JobHandle, last: JobHandle) {
        for raw in first.0..=last.0 {
            self.retract(JobHandle(raw));
        }
    }

    fn update_tx_payload(&mut self, handle: JobHandle, payload: &[u8]) -> bool {
        let Some(job) = self.tx_jobs.iter_mut().find(|job| job.handle == handle) else {
            return false;
        };
        job.payload.clear();
        job.payload.extend_from_slice(payload).unwrap();
        self.payload_updates.push((handle, payload.to_vec()));
        true
    }
}
