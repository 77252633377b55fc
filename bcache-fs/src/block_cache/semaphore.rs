use core::sync::atomic;
use core::sync::atomic::AtomicUsize;

/// 计数信号量，约束同时存在的槽位数不超过容量。
///
/// 缓存只需要非阻塞的 P 操作：拿不到名额就去换出。
#[derive(Debug)]
pub struct Semaphore {
    permits: AtomicUsize,
}

impl Semaphore {
    pub const fn new(permits: usize) -> Self {
        Self {
            permits: AtomicUsize::new(permits),
        }
    }

    /// Verhogen 增加
    pub fn up(&self) {
        self.permits.fetch_add(1, atomic::Ordering::Release);
    }

    /// Proberen 尝试，资源派发完就立即放弃
    pub fn try_down(&self) -> bool {
        let mut permits = self.permits.load(atomic::Ordering::Acquire);

        // 尝试获取到一个资源，直到成功为止；
        // 若中途发现资源用光，则返回失败。
        loop {
            if permits == 0 {
                return false;
            }
            match self.permits.compare_exchange(
                permits,
                permits - 1,
                atomic::Ordering::AcqRel,
                atomic::Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => permits = current,
            }
        }
    }

    #[cfg(test)]
    pub fn permits(&self) -> usize {
        self.permits.load(atomic::Ordering::Acquire)
    }
}
