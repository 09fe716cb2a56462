pub mod helper {
    use std::cell::Cell;
    use std::sync::atomic::AtomicUsize;

    pub(crate) const CONNECTED: usize = 1;

    pub(crate) struct DropGuard<'a>(pub &'a Cell<u32>);

    impl Drop for DropGuard<'_> {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    /// A placeholder database connection.
    pub(crate) struct Connection {
        pub(crate) handshake: AtomicUsize,
    }

    impl Connection {
        pub(crate) fn open() -> Self {
            Connection { handshake: AtomicUsize::new(CONNECTED) }
        }
    }
}

macro_rules! generate_tests_non_blocking {
    () => {
        use std::cell::Cell;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::{Arc, Barrier};
        use std::thread;

        use crate::tests::helper::DropGuard;
        use crate::{TryGetError, TryInitError};

        use super::{FallibleSingleton, Singleton, SingletonCell};

        const THREADS: usize = 8;

        #[test]
        fn cell_uninit() {
            let cell: SingletonCell<i32> = SingletonCell::uninit();
            assert_eq!(cell.try_get(), Err(TryGetError::Uninit));
            assert_eq!(cell.into_inner(), None);
        }

        #[test]
        fn cell_debug() {
            let cell = SingletonCell::uninit();
            assert_eq!(format!("{:?}", cell), "SingletonCell { inner: None }");
            assert_eq!(cell.try_get_or_init(|| 1), Ok(&1));
            assert_eq!(format!("{:?}", cell), "SingletonCell { inner: Some(1) }");
        }

        #[test]
        fn cell_into_inner() {
            let count = Cell::new(0);

            let cell = SingletonCell::uninit();
            assert!(cell.try_get_or_init(|| DropGuard(&count)).is_ok());

            let inner = cell.into_inner().unwrap();
            assert_eq!(count.get(), 0);
            drop(inner);
            assert_eq!(count.get(), 1);
        }

        #[test]
        fn cell_drop() {
            let count = Cell::new(0);

            let cell = SingletonCell::uninit();
            assert!(cell.try_get_or_init(|| DropGuard(&count)).is_ok());
            assert!(cell.try_get_or_init(|| DropGuard(&count)).is_ok());
            assert_eq!(count.get(), 0);

            drop(cell);
            assert_eq!(count.get(), 1);
        }

        #[test]
        fn cell_get_mut() {
            let mut cell = SingletonCell::uninit();
            assert_eq!(cell.get_mut(), None);
            assert!(cell.try_get_or_init(|| vec![1]).is_ok());

            cell.get_mut().unwrap().push(2);
            assert_eq!(cell.try_get(), Ok(&vec![1, 2]));
        }

        #[test]
        fn try_acquire_constructs_once() {
            let count = Arc::new(AtomicUsize::new(0));
            let constructions = Arc::clone(&count);
            let singleton = Singleton::new(move || {
                constructions.fetch_add(1, Ordering::Relaxed);
                String::from("connection")
            });

            assert_eq!(singleton.try_get(), Err(TryGetError::Uninit));
            let first = singleton.try_acquire().unwrap();
            let second = singleton.try_acquire().unwrap();

            assert!(std::ptr::eq(first, second));
            assert_eq!(count.load(Ordering::Relaxed), 1);
            assert_eq!(singleton.into_inner().as_deref(), Some("connection"));
        }

        #[test]
        fn try_acquire_concurrent() {
            let barrier = Arc::new(Barrier::new(THREADS + 1));
            let cell = Arc::new(SingletonCell::uninit());

            let handles: Vec<_> = (0..THREADS)
                .map(|id| {
                    let barrier = Arc::clone(&barrier);
                    let cell = Arc::clone(&cell);
                    thread::spawn(move || {
                        barrier.wait();
                        // the main thread may still hold the guard, but it
                        // must have constructed the resource
                        match cell.try_get_or_init(|| id + 1) {
                            Ok(res) => assert_eq!(*res, 0),
                            Err(_) => {}
                        }
                    })
                })
                .collect();

            let res = cell.try_get_or_init(|| {
                barrier.wait();
                0
            });

            assert_eq!(res, Ok(&0));
            assert_eq!(cell.try_get(), Ok(&0));

            for handle in handles {
                handle.join().unwrap();
            }
        }

        #[test]
        fn recursive() {
            let cell = SingletonCell::uninit();
            let res = cell.try_get_or_init(|| {
                assert_eq!(cell.try_get(), Err(TryGetError::WouldBlock));
                assert!(cell.try_get_or_init(|| 2).is_err());
                1
            });

            assert_eq!(res, Ok(&1));
            assert_eq!(cell.try_get(), Ok(&1));
        }

        #[test]
        fn try_acquire_retries_after_failure() {
            let attempts = AtomicUsize::new(0);
            let singleton = FallibleSingleton::new(|| {
                match attempts.fetch_add(1, Ordering::Relaxed) {
                    0 => Err("connection refused"),
                    _ => Ok(1),
                }
            });

            let res = singleton.try_acquire();
            assert_eq!(res, Err(TryInitError::ConstructionFailed("connection refused")));
            assert_eq!(singleton.try_get(), Err(TryGetError::Uninit));

            assert_eq!(singleton.try_acquire(), Ok(&1));
            assert_eq!(singleton.try_acquire(), Ok(&1));
            assert_eq!(attempts.load(Ordering::Relaxed), 2);
        }

        #[test]
        fn try_acquire_would_block_in_constructor() {
            let cell: SingletonCell<i32> = SingletonCell::uninit();
            let res = cell.try_get_or_try_init(|| {
                let nested = cell.try_get_or_try_init(|| Ok::<_, ()>(2));
                assert_eq!(nested, Err(TryInitError::WouldBlock));
                Err(())
            });

            assert_eq!(res, Err(TryInitError::ConstructionFailed(())));
            assert_eq!(cell.try_get(), Err(TryGetError::Uninit));
        }
    };
}

macro_rules! generate_tests {
    () => {
        use std::panic::{self, AssertUnwindSafe};
        use std::sync::atomic::AtomicBool;
        use std::time::Duration;

        use crate::tests::helper::{Connection, CONNECTED};
        use crate::{Acquisition, SingletonState};

        #[test]
        fn concurrent_callers_construct_once() {
            const CALLERS: usize = 10;

            let count = Arc::new(AtomicUsize::new(0));
            let constructions = Arc::clone(&count);
            let singleton = Arc::new(Singleton::new(move || {
                constructions.fetch_add(1, Ordering::Relaxed);
                // models a slow connection setup
                thread::sleep(Duration::from_millis(20));
                Connection::open()
            }));

            let barrier = Arc::new(Barrier::new(CALLERS));
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    let barrier = Arc::clone(&barrier);
                    let singleton = Arc::clone(&singleton);
                    thread::spawn(move || {
                        barrier.wait();
                        let (conn, outcome) = singleton.acquire_with_outcome();
                        (conn as *const Connection as usize, outcome)
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
            let constructed =
                results.iter().filter(|(_, outcome)| *outcome == Acquisition::Constructed).count();
            let already_ready =
                results.iter().filter(|(_, outcome)| *outcome == Acquisition::AlreadyReady).count();

            assert_eq!(count.load(Ordering::Relaxed), 1);
            assert_eq!((constructed, already_ready), (1, CALLERS - 1));

            let addr = singleton.acquire() as *const Connection as usize;
            assert!(results.iter().all(|(res, _)| *res == addr));
        }

        #[test]
        fn no_partially_constructed_resource_is_observed() {
            let constructing = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&constructing);
            let singleton = Arc::new(Singleton::new(move || {
                flag.store(true, Ordering::SeqCst);
                // models a slow connection setup
                thread::sleep(Duration::from_millis(50));
                let conn = Connection::open();
                flag.store(false, Ordering::SeqCst);
                conn
            }));

            let barrier = Arc::new(Barrier::new(THREADS + 1));
            let handles: Vec<_> = (0..THREADS)
                .map(|id| {
                    let barrier = Arc::clone(&barrier);
                    let constructing = Arc::clone(&constructing);
                    let singleton = Arc::clone(&singleton);
                    thread::spawn(move || {
                        barrier.wait();
                        // every way of obtaining the resource must either fail
                        // or see the construction completed
                        let conn = loop {
                            let res = match id % 3 {
                                0 => singleton.try_get().ok(),
                                1 => singleton.get(),
                                _ => Some(singleton.acquire()),
                            };

                            match res {
                                Some(conn) => {
                                    assert!(!constructing.load(Ordering::SeqCst));
                                    break conn;
                                }
                                None => thread::yield_now(),
                            }
                        };

                        conn.handshake.load(Ordering::Relaxed)
                    })
                })
                .collect();

            barrier.wait();
            let conn = singleton.acquire();
            assert!(!constructing.load(Ordering::SeqCst));
            assert_eq!(conn.handshake.load(Ordering::Relaxed), CONNECTED);

            for handle in handles {
                assert_eq!(handle.join().unwrap(), CONNECTED);
            }
        }

        #[cfg(feature = "std")]
        #[test]
        fn acquire_timeout_while_constructing() {
            let barrier = Arc::new(Barrier::new(2));
            let constructing = Arc::clone(&barrier);
            let singleton = Arc::new(Singleton::new(move || {
                constructing.wait();
                thread::sleep(Duration::from_millis(200));
                1
            }));

            let handle = {
                let singleton = Arc::clone(&singleton);
                thread::spawn(move || *singleton.acquire_timeout(Duration::from_secs(10)).unwrap())
            };

            // the spawned thread now holds the guard until construction is complete
            barrier.wait();
            let res = singleton.acquire_timeout(Duration::from_millis(10));
            assert_eq!(res, Err(crate::TimedOut(())));

            assert_eq!(handle.join().unwrap(), 1);
            assert_eq!(singleton.acquire_timeout(Duration::from_millis(10)), Ok(&1));
        }

        #[cfg(feature = "std")]
        #[test]
        fn acquire_zero_timeout_on_released_guard() {
            let singleton: Singleton<i32> = Singleton::new(|| 1);
            assert_eq!(singleton.acquire_timeout(Duration::ZERO), Ok(&1));
            assert_eq!(singleton.acquire_timeout(Duration::ZERO), Ok(&1));
        }

        #[test]
        fn sequential_acquire_returns_same_instance() {
            let count = AtomicUsize::new(0);
            let singleton = Singleton::new(|| {
                count.fetch_add(1, Ordering::Relaxed);
                Connection::open()
            });

            assert_eq!(singleton.state(), SingletonState::Uninitialized);
            assert!(singleton.get().is_none());

            let (first, outcome) = singleton.acquire_with_outcome();
            assert_eq!(outcome, Acquisition::Constructed);
            assert_eq!(singleton.state(), SingletonState::Ready);

            for _ in 0..100 {
                let (res, outcome) = singleton.acquire_with_outcome();
                assert_eq!(outcome, Acquisition::AlreadyReady);
                assert!(std::ptr::eq(first, res));
            }

            assert!(std::ptr::eq(first, singleton.get().unwrap()));
            assert!(singleton.is_initialized());
            assert_eq!(count.load(Ordering::Relaxed), 1);
        }

        #[test]
        fn failed_construction_is_retried() {
            let attempts = AtomicUsize::new(0);
            let singleton = FallibleSingleton::new(|| {
                match attempts.fetch_add(1, Ordering::Relaxed) {
                    0 => Err("connection refused"),
                    _ => Ok(String::from("connection")),
                }
            });

            let err = singleton.acquire().unwrap_err();
            assert_eq!(err.into_inner(), "connection refused");
            assert_eq!(singleton.state(), SingletonState::Uninitialized);
            assert!(singleton.get().is_none());

            assert_eq!(singleton.acquire().map(String::as_str), Ok("connection"));
            assert_eq!(singleton.acquire().map(String::as_str), Ok("connection"));
            assert_eq!(singleton.state(), SingletonState::Ready);
            assert_eq!(attempts.load(Ordering::Relaxed), 2);
        }

        #[test]
        fn waiters_retry_after_failed_construction() {
            let barrier = Arc::new(Barrier::new(THREADS));
            let attempts = Arc::new(AtomicUsize::new(0));
            let counted = Arc::clone(&attempts);
            let singleton = Arc::new(FallibleSingleton::new(move || {
                thread::sleep(Duration::from_millis(10));
                match counted.fetch_add(1, Ordering::Relaxed) {
                    0 => Err("connection refused"),
                    _ => Ok(Connection::open()),
                }
            }));

            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let barrier = Arc::clone(&barrier);
                    let singleton = Arc::clone(&singleton);
                    thread::spawn(move || {
                        barrier.wait();
                        singleton
                            .acquire()
                            .map(|conn| conn as *const Connection as usize)
                            .map_err(|err| err.into_inner())
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
            let failures = results.iter().filter(|res| res.is_err()).count();

            assert_eq!(failures, 1);
            assert_eq!(attempts.load(Ordering::Relaxed), 2);

            let addr = singleton.acquire().unwrap() as *const Connection as usize;
            assert!(results.iter().filter_map(|res| res.ok()).all(|res| res == addr));
        }

        #[test]
        fn panic_releases_guard() {
            let cell = SingletonCell::uninit();

            let res = panic::catch_unwind(AssertUnwindSafe(|| {
                cell.get_or_init(|| panic!("explicit panic"));
            }));

            assert!(res.is_err());
            assert_eq!(cell.state(), SingletonState::Uninitialized);
            assert_eq!(cell.get_or_init(|| 1), &1);
            assert_eq!(cell.state(), SingletonState::Ready);
        }

        #[test]
        fn panic_in_other_thread_releases_guard() {
            let singleton = Arc::new(Singleton::new(|| -> i32 { panic!("explicit panic") }));

            let thread_singleton = Arc::clone(&singleton);
            thread::spawn(move || {
                thread_singleton.acquire();
            })
            .join()
            .unwrap_err();

            assert!(!singleton.is_initialized());
            assert_eq!(singleton.get(), None);
        }

        #[test]
        fn cell_block() {
            let barrier = Arc::new(Barrier::new(THREADS + 1));
            let cell = Arc::new(SingletonCell::uninit());

            let handles: Vec<_> = (0..THREADS)
                .map(|id| {
                    let barrier = Arc::clone(&barrier);
                    let cell = Arc::clone(&cell);
                    thread::spawn(move || {
                        barrier.wait();
                        // all threads block and have to wait for the main
                        // thread to construct the resource
                        if id % 2 == 0 {
                            assert_eq!(cell.get_or_init(|| id + 1), &0);
                        } else {
                            assert_eq!(cell.get(), Some(&0));
                        }
                    })
                })
                .collect();

            let res = cell.get_or_init(|| {
                barrier.wait();
                thread::sleep(Duration::from_millis(10));
                0
            });

            assert_eq!(*res, 0);

            for handle in handles {
                handle.join().unwrap();
            }
        }

        #[test]
        fn cell_get_or_try_init() {
            let cell = SingletonCell::uninit();
            let err = cell.get_or_try_init(|| Err(404)).unwrap_err();
            assert_eq!(*err.inner(), 404);
            assert!(!cell.is_initialized());

            assert_eq!(cell.get_or_try_init(|| Ok::<_, i32>("connection")), Ok(&"connection"));
            assert_eq!(cell.get_or_try_init(|| Err(500)), Ok(&"connection"));
            assert!(cell.is_initialized());
        }
    };
}
