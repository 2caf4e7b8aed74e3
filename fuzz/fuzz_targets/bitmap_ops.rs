#![no_main]
use libfuzzer_sys::fuzz_target;
use tribits::{Bitmap, BitmapTriples, Config};

fuzz_target!(|data: (Vec<u64>, usize, Vec<u8>)| {
    let (words, len_raw, section) = data;

    // Arbitrary bytes must decode cleanly or fail with an error.
    let _ = Bitmap::from_bytes(&section);
    if let Ok(bt) = BitmapTriples::from_bytes(&section, &Config::default()) {
        let _ = bt.iter().count();
    }

    if words.is_empty() {
        return;
    }
    let len = len_raw % (words.len() * 64);
    let bm = match Bitmap::from_words(words.clone(), len) {
        Ok(bm) => bm,
        Err(_) => return,
    };

    // Check total rank
    let mut expected_total = 0;
    for i in 0..len {
        if (words[i / 64] >> (i % 64)) & 1 == 1 {
            expected_total += 1;
        }
    }
    assert_eq!(bm.rank1_before(len), expected_total);
    assert_eq!(bm.count_ones(), expected_total);

    // Check select1 for a derived rank
    if expected_total > 0 {
        let k = (len_raw / 13) % expected_total + 1;
        let pos = bm.select1(k).unwrap();
        assert!(pos < len);
        assert!(bm.access(pos).unwrap());
        assert_eq!(bm.rank1(pos), k);
        assert_eq!(bm.rank1_before(pos), k - 1);
    }
});
