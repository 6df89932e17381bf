use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use crate::Error;

/// Runs `work` on every item using up to `num_threads` scoped threads,
/// and returns the results in the original order.
///
/// The first error stops handing out new items and is returned.
pub fn map_ordered<T, R, F>(num_threads: u8, name: &str, items: Vec<T>, work: F) -> Result<Vec<R>, Error> where
    T: Send,
    R: Send,
    F: Fn(T) -> Result<R, Error> + Sync,
{
    let len = items.len();
    if num_threads <= 1 || len <= 1 {
        return items.into_iter().map(work).collect();
    }

    let failed = &AtomicBool::new(false);
    let work = &work;
    std::thread::scope(move |scope| -> Result<Vec<R>, Error> {
        let (s, r) = crossbeam_channel::bounded::<(usize, T)>(2);
        let (done_s, done_r) = crossbeam_channel::unbounded::<(usize, R)>();
        let thread = move || {
            catch_unwind(AssertUnwindSafe(|| -> Result<(), Error> {
                for (idx, item) in r {
                    if failed.load(SeqCst) {
                        break;
                    }
                    match work(item) {
                        Ok(res) => done_s.send((idx, res))?,
                        Err(e) => {
                            failed.store(true, SeqCst);
                            return Err(e);
                        },
                    }
                }
                Ok(())
            })).map_err(move |_| {
                failed.store(true, SeqCst);
                Error::ThreadSend
            })?
        };
        let spawn = move |n, thread| {
            std::thread::Builder::new().name(format!("{name}{n}")).spawn_scoped(scope, thread).map_err(|_| {
                failed.store(true, SeqCst);
                Error::ThreadSend
            })
        };
        let num_threads = num_threads.min(u8::try_from(len).unwrap_or(u8::MAX));
        let mut handles = Vec::with_capacity(num_threads.into());
        for n in 0..num_threads-1 {
            handles.push(spawn(n, thread.clone())?);
        }
        handles.push(spawn(num_threads-1, thread)?);

        for job in items.into_iter().enumerate() {
            if failed.load(SeqCst) || s.send(job).is_err() {
                break;
            }
        }
        drop(s);
        handles.into_iter().try_for_each(|h| h.join().map_err(|_| Error::ThreadSend)?)?;

        let mut results: Vec<Option<R>> = (0..len).map(|_| None).collect();
        for (idx, res) in done_r.try_iter() {
            results[idx] = Some(res);
        }
        results.into_iter().map(|r| r.ok_or(Error::ThreadSend)).collect()
    })
}
