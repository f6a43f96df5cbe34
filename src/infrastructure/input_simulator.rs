use crate::domain::models::{TapOutcome, TapSide};
use crate::domain::router::TapRequest;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const LEFT_RATIO: f64 = 0.25;
const RIGHT_RATIO: f64 = 0.75;
const CENTER_Y_RATIO: f64 = 0.5;

/// Performs a tap on one side of the screen.
pub trait GestureExecutor: Send + Sync {
    fn tap(&self, side: TapSide) -> anyhow::Result<TapOutcome>;
}

/// Screen coordinate for a page-turn tap on a `width` x `height` display.
pub fn tap_point(side: TapSide, width: i32, height: i32) -> (i32, i32) {
    let ratio = match side {
        TapSide::Left => LEFT_RATIO,
        TapSide::Right => RIGHT_RATIO,
    };
    (
        (f64::from(width) * ratio) as i32,
        (f64::from(height) * CENTER_Y_RATIO) as i32,
    )
}

/// Consumes tap requests until the router is dropped. Outcomes are only
/// logged; the router never waits for them.
pub async fn run_tap_worker(
    mut requests: mpsc::UnboundedReceiver<TapRequest>,
    executor: Arc<dyn GestureExecutor>,
) {
    while let Some(request) = requests.recv().await {
        let side = request.side;
        debug!("Tap request: {} ({})", side, request.command.kind());
        let exec = executor.clone();
        match tokio::task::spawn_blocking(move || exec.tap(side)).await {
            Ok(Ok(outcome)) => info!(
                "Dispatch tap {} at x={} y={} result={}",
                outcome.side, outcome.x, outcome.y, outcome.dispatched
            ),
            Ok(Err(e)) => warn!("Tap {} failed: {}", side, e),
            Err(e) => warn!("Tap worker task failed: {}", e),
        }
    }
}

/// Executor for platforms without input injection: logs the tap it would
/// have performed.
pub struct LoggingExecutor {
    width: i32,
    height: i32,
}

impl LoggingExecutor {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl GestureExecutor for LoggingExecutor {
    fn tap(&self, side: TapSide) -> anyhow::Result<TapOutcome> {
        let (x, y) = tap_point(side, self.width, self.height);
        info!("Tap {} at ({}, {}) not injected on this platform", side, x, y);
        Ok(TapOutcome {
            side,
            x,
            y,
            dispatched: false,
        })
    }
}

pub fn platform_executor() -> Arc<dyn GestureExecutor> {
    #[cfg(windows)]
    {
        Arc::new(InputSimulator::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(LoggingExecutor::new(1920, 1080))
    }
}

#[cfg(windows)]
pub use windows_impl::InputSimulator;

#[cfg(windows)]
mod windows_impl {
    use super::{tap_point, GestureExecutor};
    use crate::domain::models::{TapOutcome, TapSide};
    use tracing::{debug, trace};
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
        MOUSEINPUT, MOUSE_EVENT_FLAGS,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetSystemMetrics, SetCursorPos, SM_CXSCREEN, SM_CYSCREEN,
    };

    pub struct InputSimulator;

    impl InputSimulator {
        pub fn new() -> Self {
            Self
        }

        fn mouse_button(&self, flags: MOUSE_EVENT_FLAGS) -> bool {
            let input = INPUT {
                r#type: INPUT_MOUSE,
                Anonymous: INPUT_0 {
                    mi: MOUSEINPUT {
                        dx: 0,
                        dy: 0,
                        mouseData: 0,
                        dwFlags: flags,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            };
            let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
            sent == 1
        }
    }

    impl GestureExecutor for InputSimulator {
        fn tap(&self, side: TapSide) -> anyhow::Result<TapOutcome> {
            let (width, height) =
                unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
            let (x, y) = tap_point(side, width, height);
            trace!("Screen {}x{}, tap {} at ({}, {})", width, height, side, x, y);

            unsafe {
                SetCursorPos(x, y)?;
            }
            debug!("Mouse Left Click");
            let dispatched =
                self.mouse_button(MOUSEEVENTF_LEFTDOWN) && self.mouse_button(MOUSEEVENTF_LEFTUP);

            Ok(TapOutcome {
                side,
                x,
                y,
                dispatched,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Command, CommandKind};
    use std::sync::Mutex;

    struct RecordingExecutor {
        taps: Mutex<Vec<TapSide>>,
    }

    impl GestureExecutor for RecordingExecutor {
        fn tap(&self, side: TapSide) -> anyhow::Result<TapOutcome> {
            self.taps.lock().unwrap().push(side);
            if side == TapSide::Left {
                anyhow::bail!("left edge blocked");
            }
            Ok(TapOutcome {
                side,
                x: 0,
                y: 0,
                dispatched: true,
            })
        }
    }

    #[test]
    fn test_tap_point() {
        assert_eq!(tap_point(TapSide::Left, 1920, 1080), (480, 540));
        assert_eq!(tap_point(TapSide::Right, 1920, 1080), (1440, 540));
    }

    #[test]
    fn test_logging_executor_reports_not_dispatched() {
        let outcome = LoggingExecutor::new(1000, 500).tap(TapSide::Right).unwrap();
        assert_eq!((outcome.x, outcome.y), (750, 250));
        assert!(!outcome.dispatched);
    }

    #[tokio::test]
    async fn test_worker_survives_executor_errors() {
        let executor = Arc::new(RecordingExecutor {
            taps: Mutex::new(Vec::new()),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        for (side, kind) in [(TapSide::Left, CommandKind::Prev), (TapSide::Right, CommandKind::Next)] {
            tx.send(TapRequest {
                side,
                command: Command::new(kind, 0, "test"),
            })
            .unwrap();
        }
        drop(tx);

        run_tap_worker(rx, executor.clone()).await;
        assert_eq!(
            *executor.taps.lock().unwrap(),
            vec![TapSide::Left, TapSide::Right]
        );
    }
}
