pub mod geometry;
pub mod lru;
pub mod simulation;
pub mod stats;
pub mod trace;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
use wasm_bindgen::prelude::*;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
#[wasm_bindgen]
pub fn run_simulation(
    trace: &str,
    set_index_bits: u32,
    lines_per_set: usize,
    block_offset_bits: u32,
    verbose: bool,
) -> String {
    use geometry::Geometry;
    use lru::LruCache;
    use simulation::Options;

    let geometry = match Geometry::new(set_index_bits, lines_per_set, block_offset_bits) {
        Ok(geometry) => geometry,
        Err(e) => return e.to_string(),
    };
    let mut lru_cache = LruCache::new(geometry);

    let mut out = Vec::new();
    let mut result = vec![geometry.format_info()];

    match simulation::simulate(&mut lru_cache, trace, Options { verbose }, &mut out) {
        Ok(report) => {
            if verbose {
                result.push(String::from_utf8_lossy(&out).trim_end().to_string());
            }
            result.push(report.stats.to_string());
        }
        Err(e) => return e.to_string(),
    };

    result.join("\n")
}
