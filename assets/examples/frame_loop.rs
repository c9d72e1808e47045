use fibre_assets::{
  Archive, ArchiveError, ArchiveStore, BundlePath, ByteSource, CacheBuilder, EvictionReason, LoadStrategy, Request,
  StaticManifest,
};
use std::path::Path;
use std::sync::Arc;

// A byte source that fabricates text for any path ending in ".txt".
struct TextFiles;

impl ByteSource<String> for TextFiles {
  fn load(&self, path: &str) -> Option<Arc<String>> {
    path
      .ends_with(".txt")
      .then(|| Arc::new(format!("text of {}", path)))
  }
}

// Every archive contains any asset you ask for.
struct Packs;

struct Pack(String);

impl Archive<String> for Pack {
  fn load_asset(&self, name: &str) -> Option<Arc<String>> {
    Some(Arc::new(format!("{} from {}", name, self.0)))
  }

  fn unload(&self) {
    println!("  (archive {} released)", self.0);
  }
}

impl ArchiveStore<String> for Packs {
  fn open(&self, path: &Path) -> Result<Arc<dyn Archive<String>>, ArchiveError> {
    Ok(Arc::new(Pack(path.display().to_string())))
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  // "pack/asset" paths live in bundles; everything else is a loose file.
  let resolver = |path: &str| {
    path
      .split_once('/')
      .map(|(bundle, asset)| BundlePath::new(bundle, asset))
  };

  let cache = CacheBuilder::<String>::new(TextFiles)
    .bundles(Packs, StaticManifest::new().with("levels", ["textures"]))
    .resolver(resolver)
    .strategy(LoadStrategy::Batch)
    .evict_after_frames(3)
    .eviction_listener(|path: &str, _value: Arc<String>, reason: EvictionReason| {
      println!("  evicted {} ({})", path, reason);
    })
    .build()
    .expect("valid cache configuration");
  let scheduler = cache.frame_scheduler().expect("default scheduler").clone();

  println!("--- Submitting a request ---");
  let request = cache.submit(
    Request::new()
      .with_task("intro", "intro.txt")
      .with_task("level", "levels/forest")
      .with_callback(|request| {
        for task in request.tasks() {
          println!("  {} -> {:?}", task.tag(), task.result());
        }
      }),
  );

  // The host's main loop: one tick per rendered frame.
  for frame in 1..=8 {
    println!("--- Frame {} ---", frame);
    scheduler.tick();
    if frame == 2 {
      println!("{}", cache.dump());
    }
  }

  println!("request done: {}", request.is_done());
  println!("{:?}", cache.metrics());
}
