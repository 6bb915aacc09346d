//! Job dispatcher
//!
//! Global fixed worker-thread pool plus a delayed-job timer thread. Jobs are
//! data-only records: a plain function pointer and a small byte payload;
//! no job captures references into another job's state. Workers that need
//! context encode a handle into the payload and resolve it on the executing
//! thread.

use std::collections::{BinaryHeap, VecDeque};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Size of a job's inline payload.
pub const JOB_DATA_SIZE: usize = 16;

/// Inline job payload.
pub type JobData = [u8; JOB_DATA_SIZE];

/// Job entry point.
pub type JobFn = fn(JobData);

/// A schedulable unit of work.
#[derive(Clone, Copy)]
pub struct Job {
    pub func: JobFn,
    pub data: JobData,
}

impl Job {
    pub fn new(func: JobFn, data: JobData) -> Self {
        Self { func, data }
    }

    fn run(self) {
        (self.func)(self.data);
    }
}

struct TimedJob {
    at: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for TimedJob {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for TimedJob {}

impl PartialOrd for TimedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline wins.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Fixed thread pool with a delayed-job timer.
pub struct JobDispatcher {
    queue: Mutex<VecDeque<Job>>,
    queue_signal: Condvar,
    timed: Mutex<(BinaryHeap<TimedJob>, u64)>,
    timed_signal: Condvar,
}

static GLOBAL: OnceLock<&'static JobDispatcher> = OnceLock::new();
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds since process start, the wall clock islands are paced by.
pub fn current_time() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

impl JobDispatcher {
    /// The process-wide dispatcher, started on first use with one worker
    /// thread per available core (minus one for the caller, at least two).
    pub fn global() -> &'static JobDispatcher {
        GLOBAL.get_or_init(|| {
            let threads = std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(2)
                .max(2);
            JobDispatcher::spawn(threads)
        })
    }

    /// Allocate a dispatcher for the process lifetime and start its threads.
    fn spawn(num_threads: usize) -> &'static JobDispatcher {
        let leaked: &'static JobDispatcher = Box::leak(Box::new(JobDispatcher {
            queue: Mutex::new(VecDeque::new()),
            queue_signal: Condvar::new(),
            timed: Mutex::new((BinaryHeap::new(), 0)),
            timed_signal: Condvar::new(),
        }));

        for i in 0..num_threads {
            std::thread::Builder::new()
                .name(format!("physics-job-{i}"))
                .spawn(move || leaked.worker_loop())
                .expect("failed to spawn dispatcher worker");
        }
        std::thread::Builder::new()
            .name("physics-timer".into())
            .spawn(move || leaked.timer_loop())
            .expect("failed to spawn dispatcher timer");

        leaked
    }

    /// Enqueue a job for immediate execution.
    pub fn async_job(&self, job: Job) {
        let mut queue = self.queue.lock();
        queue.push_back(job);
        self.queue_signal.notify_one();
    }

    /// Enqueue a job to run after `delay` seconds.
    pub fn async_after(&self, delay: f64, job: Job) {
        let at = Instant::now() + Duration::from_secs_f64(delay.max(0.0));
        let mut timed = self.timed.lock();
        let seq = timed.1;
        timed.1 += 1;
        timed.0.push(TimedJob { at, seq, job });
        self.timed_signal.notify_one();
    }

    fn worker_loop(&self) {
        loop {
            let job = {
                let mut queue = self.queue.lock();
                while queue.is_empty() {
                    self.queue_signal.wait(&mut queue);
                }
                queue.pop_front().unwrap()
            };
            job.run();
        }
    }

    fn timer_loop(&self) {
        loop {
            let due = {
                let mut timed = self.timed.lock();
                loop {
                    let next_at = timed.0.peek().map(|j| j.at);
                    match next_at {
                        None => {
                            self.timed_signal.wait(&mut timed);
                        }
                        Some(at) if at > Instant::now() => {
                            self.timed_signal.wait_until(&mut timed, at);
                        }
                        Some(_) => break timed.0.pop().unwrap(),
                    }
                }
            };
            self.async_job(due.job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn bump(_data: JobData) {
        COUNTER.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_for(predicate: impl Fn() -> bool, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        predicate()
    }

    #[test]
    fn test_jobs_execute() {
        let dispatcher = JobDispatcher::global();
        let before = COUNTER.load(Ordering::SeqCst);
        for _ in 0..4 {
            dispatcher.async_job(Job::new(bump, [0; JOB_DATA_SIZE]));
        }
        assert!(
            wait_for(
                || COUNTER.load(Ordering::SeqCst) >= before + 4,
                Duration::from_secs(5)
            ),
            "queued jobs did not run"
        );
    }

    #[test]
    fn test_delayed_job_runs_after_delay() {
        let dispatcher = JobDispatcher::global();
        let before = COUNTER.load(Ordering::SeqCst);
        let started = Instant::now();
        dispatcher.async_after(0.05, Job::new(bump, [0; JOB_DATA_SIZE]));

        assert!(
            wait_for(
                || COUNTER.load(Ordering::SeqCst) > before,
                Duration::from_secs(5)
            ),
            "delayed job never ran"
        );
        assert!(
            started.elapsed() >= Duration::from_millis(40),
            "delayed job ran too early"
        );
    }

    #[test]
    fn test_payload_round_trips() {
        use std::sync::atomic::AtomicU64;
        static PAYLOAD: AtomicU64 = AtomicU64::new(0);

        fn record(data: JobData) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[..8]);
            PAYLOAD.store(u64::from_le_bytes(bytes), Ordering::SeqCst);
        }

        let mut data = [0u8; JOB_DATA_SIZE];
        data[..8].copy_from_slice(&0xDEADBEEFu64.to_le_bytes());
        JobDispatcher::global().async_job(Job::new(record, data));

        assert!(wait_for(
            || PAYLOAD.load(Ordering::SeqCst) == 0xDEADBEEF,
            Duration::from_secs(5)
        ));
    }
}
