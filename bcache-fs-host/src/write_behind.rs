use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use bcache_fs::{BlockCache, WriteBehind};

/// 运行中的后台写回线程，丢弃时停止并等待它退出
#[derive(Debug)]
pub struct WriteBehindThread {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// 启动写回线程，每 `tick` 算一个时钟滴答，周期取自缓存配置
pub fn spawn_write_behind(cache: Arc<BlockCache>, tick: Duration) -> io::Result<WriteBehindThread> {
    let (stop, signal) = mpsc::channel::<()>();
    let daemon = WriteBehind::new(cache);

    let handle = thread::Builder::new()
        .name("write_behind".to_owned())
        .spawn(move || {
            daemon.run(|ticks| {
                let period = tick.saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX));
                // 等待停止信号，超时即到了下一个周期
                match signal.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => ControlFlow::Continue(()),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => ControlFlow::Break(()),
                }
            })
        })?;

    Ok(WriteBehindThread {
        stop: Some(stop),
        handle: Some(handle),
    })
}

impl WriteBehindThread {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            // 线程可能已经退出，发送失败无妨
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("write-behind thread panicked");
            }
        }
    }
}

impl Drop for WriteBehindThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
