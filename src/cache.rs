//! NFP cache (§4.C): an in-memory, at-most-once-per-key computation cache
//! with an optional durable on-disk backing store (§6 persisted layout).
//!
//! State machine per key: `Absent -> Pending -> Ready`. `Pending` is only
//! observable internally (via [`std::sync::OnceLock`]'s blocking
//! `get_or_init`); external callers only ever see `Absent` (a cache miss
//! that triggers computation) or `Ready` (the returned value).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::nfp::Nfp;
use crate::types::{CacheKey, Point};

type Slot = Arc<OnceLock<Option<Nfp>>>;

pub struct NfpCache {
    memory: Mutex<HashMap<CacheKey, Slot>>,
    writer: Option<Mutex<BufWriter<File>>>,
    /// Count of keys served directly from a pre-populated entry, i.e. no
    /// `compute` closure ran. Exposed for test-mode assertions (§8
    /// scenario 6: "run B spends no time in NFP computation").
    hits: Mutex<u64>,
}

impl NfpCache {
    /// In-memory-only cache, no durable backing store.
    pub fn new() -> Self {
        NfpCache {
            memory: Mutex::new(HashMap::new()),
            writer: None,
            hits: Mutex::new(0),
        }
    }

    /// Open (or create) a durable cache backed by `dir/nfp_cache.log`. On
    /// start, loads the latest trailer if present; otherwise replays the
    /// whole log.
    pub fn open(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let log_path = dir.join("nfp_cache.log");
        let trailer_path = dir.join("nfp_cache.trailer");

        let mut memory = HashMap::new();
        if trailer_path.exists() {
            match load_trailer(&trailer_path) {
                Ok(entries) => {
                    info!(count = entries.len(), "loaded NFP cache trailer");
                    for (key, nfp) in entries {
                        memory.insert(key, Arc::new(OnceLock::from(Some(nfp))));
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load trailer, replaying log");
                    replay_log(&log_path, &mut memory)?;
                }
            }
        } else if log_path.exists() {
            replay_log(&log_path, &mut memory)?;
            info!(count = memory.len(), "replayed NFP cache log");
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(NfpCache {
            memory: Mutex::new(memory),
            writer: Some(Mutex::new(BufWriter::new(file))),
            hits: Mutex::new(0),
        })
    }

    /// At-most-once computation per key: the first caller for a missing
    /// key runs `compute`; concurrent callers block on the same
    /// in-flight computation and observe its result.
    pub fn get_or_compute(&self, key: CacheKey, compute: impl FnOnce() -> Option<Nfp>) -> Option<Nfp> {
        let slot = {
            let mut map = self.memory.lock();
            map.entry(key).or_insert_with(|| Arc::new(OnceLock::new())).clone()
        };

        let already_ready = slot.get().is_some();
        let result = slot
            .get_or_init(|| {
                debug!(?key, "NFP cache miss, computing");
                let computed = compute();
                if let Some(nfp) = &computed {
                    self.persist(key, nfp);
                }
                computed
            })
            .clone();
        if already_ready {
            *self.hits.lock() += 1;
            debug!(?key, "NFP cache hit");
        }
        result
    }

    pub fn hits(&self) -> u64 {
        *self.hits.lock()
    }

    fn persist(&self, key: CacheKey, nfp: &Nfp) {
        let Some(writer) = &self.writer else { return };
        let key_bytes = encode_key(&key);
        let nfp_bytes = encode_nfp(nfp);
        let mut w = writer.lock();
        let result = (|| -> io::Result<()> {
            w.write_u32::<LittleEndian>(key_bytes.len() as u32)?;
            w.write_all(&key_bytes)?;
            w.write_u32::<LittleEndian>(nfp_bytes.len() as u32)?;
            w.write_all(&nfp_bytes)?;
            w.flush()
        })();
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist NFP cache record");
        }
    }

    /// Remove entries whose source id is not in `live_sources`. Should
    /// run once on engine start before a run begins.
    pub fn compact(&self, live_sources: &std::collections::HashSet<u64>) {
        let mut map = self.memory.lock();
        map.retain(|key, _| {
            live_sources.contains(&key.a_source) && live_sources.contains(&key.b_source)
        });
    }

    /// Write a trailer index for the current in-memory state, enabling a
    /// fast load next run without replaying the whole log.
    pub fn write_trailer(&self, dir: &Path) -> io::Result<()> {
        let trailer_path = dir.join("nfp_cache.trailer");
        let tmp_path = dir.join("nfp_cache.trailer.tmp");
        let mut file = BufWriter::new(File::create(&tmp_path)?);
        let map = self.memory.lock();
        file.write_u32::<LittleEndian>(map.len() as u32)?;
        for (key, slot) in map.iter() {
            if let Some(Some(nfp)) = slot.get() {
                let key_bytes = encode_key(key);
                let nfp_bytes = encode_nfp(nfp);
                file.write_u32::<LittleEndian>(key_bytes.len() as u32)?;
                file.write_all(&key_bytes)?;
                file.write_u32::<LittleEndian>(nfp_bytes.len() as u32)?;
                file.write_all(&nfp_bytes)?;
            }
        }
        file.flush()?;
        drop(file);
        std::fs::rename(&tmp_path, &trailer_path)
    }
}

impl Default for NfpCache {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_key(key: &CacheKey) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 8 + 8 + 8 + 1);
    buf.write_u64::<LittleEndian>(key.a_source).unwrap();
    buf.write_u64::<LittleEndian>(key.b_source).unwrap();
    buf.write_i64::<LittleEndian>(key.a_rot_millideg).unwrap();
    buf.write_i64::<LittleEndian>(key.b_rot_millideg).unwrap();
    buf.write_u8(key.inside as u8).unwrap();
    buf
}

fn decode_key(mut bytes: &[u8]) -> io::Result<CacheKey> {
    let a_source = bytes.read_u64::<LittleEndian>()?;
    let b_source = bytes.read_u64::<LittleEndian>()?;
    let a_rot_millideg = bytes.read_i64::<LittleEndian>()?;
    let b_rot_millideg = bytes.read_i64::<LittleEndian>()?;
    let inside = bytes.read_u8()? != 0;
    Ok(CacheKey {
        a_source,
        b_source,
        a_rot_millideg,
        b_rot_millideg,
        inside,
    })
}

/// `{u32 n, [f64 x, f64 y, u8 exact]*n}` per §6's record encoding.
fn encode_points(buf: &mut Vec<u8>, points: &[Point]) {
    buf.write_u32::<LittleEndian>(points.len() as u32).unwrap();
    for p in points {
        buf.write_f64::<LittleEndian>(p.x).unwrap();
        buf.write_f64::<LittleEndian>(p.y).unwrap();
        buf.write_u8(p.exact as u8).unwrap();
    }
}

fn decode_points(cursor: &mut impl Read) -> io::Result<Vec<Point>> {
    let n = cursor.read_u32::<LittleEndian>()? as usize;
    let mut points = Vec::with_capacity(n);
    for _ in 0..n {
        let x = cursor.read_f64::<LittleEndian>()?;
        let y = cursor.read_f64::<LittleEndian>()?;
        let exact = cursor.read_u8()? != 0;
        points.push(Point { x, y, exact });
    }
    Ok(points)
}

/// Generalises the spec's single-polygon `{n, points, children_count,
/// children...}` encoding to a multi-region NFP: `{region_count,
/// regions..., children_count, children...}`, where each region/child is
/// itself a `{n, points}` point-list (our computed NFPs nest at most one
/// level deep: disjoint feasible regions plus hole-admission regions).
fn encode_nfp(nfp: &Nfp) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(nfp.regions.len() as u32).unwrap();
    for region in &nfp.regions {
        encode_points(&mut buf, region);
    }
    buf.write_u32::<LittleEndian>(nfp.children.len() as u32).unwrap();
    for child in &nfp.children {
        encode_points(&mut buf, child);
    }
    buf
}

fn decode_nfp(bytes: &[u8]) -> io::Result<Nfp> {
    let mut cursor = bytes;
    let region_count = cursor.read_u32::<LittleEndian>()? as usize;
    let mut regions = Vec::with_capacity(region_count);
    for _ in 0..region_count {
        regions.push(decode_points(&mut cursor)?);
    }
    let children_count = cursor.read_u32::<LittleEndian>()? as usize;
    let mut children = Vec::with_capacity(children_count);
    for _ in 0..children_count {
        children.push(decode_points(&mut cursor)?);
    }
    Ok(Nfp { regions, children })
}

fn replay_log(path: &Path, into: &mut HashMap<CacheKey, Slot>) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let mut reader = BufReader::new(File::open(path)?);
    loop {
        let key_len = match reader.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        let mut key_bytes = vec![0u8; key_len as usize];
        reader.read_exact(&mut key_bytes)?;
        let key = decode_key(&key_bytes)?;

        let nfp_len = reader.read_u32::<LittleEndian>()?;
        let mut nfp_bytes = vec![0u8; nfp_len as usize];
        reader.read_exact(&mut nfp_bytes)?;
        let nfp = decode_nfp(&nfp_bytes)?;

        into.insert(key, Arc::new(OnceLock::from(Some(nfp))));
    }
    Ok(())
}

fn load_trailer(path: &Path) -> io::Result<Vec<(CacheKey, Nfp)>> {
    let mut reader = BufReader::new(File::open(path)?);
    let count = reader.read_u32::<LittleEndian>()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key_len = reader.read_u32::<LittleEndian>()?;
        let mut key_bytes = vec![0u8; key_len as usize];
        reader.read_exact(&mut key_bytes)?;
        let key = decode_key(&key_bytes)?;

        let nfp_len = reader.read_u32::<LittleEndian>()?;
        let mut nfp_bytes = vec![0u8; nfp_len as usize];
        reader.read_exact(&mut nfp_bytes)?;
        let nfp = decode_nfp(&nfp_bytes)?;
        out.push((key, nfp));
    }
    Ok(out)
}
