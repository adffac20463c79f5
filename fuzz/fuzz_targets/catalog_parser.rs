#![no_main]

use libfuzzer_sys::fuzz_target;
use switchback::catalog::MetricCatalog;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing and validation must reject bad catalogs without panicking
        if let Ok(catalog) = MetricCatalog::from_toml_str(input) {
            let _ = catalog.validate();
        }
    }
});
