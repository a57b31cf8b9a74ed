#![no_main]
use libfuzzer_sys::fuzz_target;
use tiff_container::content::MemorySource;
use tiff_container::decoder::{Limits, TiffFileReader};

fuzz_target!(|data: &[u8]| {
    let reader = if let Ok(r) = TiffFileReader::open(MemorySource::new(data.to_vec())) {
        r
    } else {
        return;
    };

    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1_000_000;
    limits.ifd_entry_count = 10_000;
    let reader = reader.with_limits(limits);

    let directories = match reader.read_directories() {
        Ok(directories) => directories,
        Err(_) => return,
    };
    let mut fields = match reader.create_field_reader() {
        Ok(fields) => fields,
        Err(_) => return,
    };
    for entry in directories.iter().flat_map(|d| d.entries()) {
        let _ = fields.read_long8_field(entry, None, false);
        let _ = fields.read_field_bytes(entry, None);
    }
});
