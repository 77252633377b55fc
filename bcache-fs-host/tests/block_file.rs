mod common;

use std::sync::Arc;

use bcache_fs::{BLOCK_SIZE, BlockCache, CacheConfig};
use bcache_fs_host::BlockFile;

use common::{init_logger, pattern};

#[test]
fn image_survives_reopen() {
    init_logger();
    let path = std::env::temp_dir().join(format!("bcache-fs-{}.img", std::process::id()));

    {
        let file = Arc::new(BlockFile::create(&path, 32).unwrap());
        assert_eq!(file.sectors().unwrap(), 32);
        let cache = BlockCache::new(file, CacheConfig::with_capacity(2));
        for sector in 0..8 {
            cache.write(sector, 0, &pattern(sector));
        }
    }

    let file = Arc::new(BlockFile::open(&path).unwrap());
    let cache = BlockCache::new(file, CacheConfig::with_capacity(2));
    for sector in 0..8 {
        let mut buf = [0; BLOCK_SIZE];
        cache.read(sector, 0, &mut buf);
        assert_eq!(buf, pattern(sector));
    }
    drop(cache);

    std::fs::remove_file(&path).unwrap();
}
