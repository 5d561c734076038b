use proptest::prelude::*;
use shader_dag::limits::REGISTER_WORDS;
use shader_dag::{ArraySize, ConstantBufferLayout, PinFormat};

const PACKABLE: &[PinFormat] = &[
    PinFormat::Float,
    PinFormat::Floatx2,
    PinFormat::Floatx3,
    PinFormat::Floatx4,
    PinFormat::Integer,
    PinFormat::Integerx2,
    PinFormat::UIntegerx3,
    PinFormat::Float2x2,
    PinFormat::Float3x3,
    PinFormat::Float4x4,
];

fn elements() -> impl Strategy<Value = Vec<(PinFormat, ArraySize)>> {
    let format = prop::sample::select(PACKABLE);
    let size = prop_oneof![
        3 => Just(ArraySize::NotArray),
        1 => (1u32..6).prop_map(ArraySize::Static),
    ];
    prop::collection::vec((format, size), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        rng_algorithm: proptest::test_runner::RngAlgorithm::ChaCha,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0x5AD_E7),
        .. ProptestConfig::default()
    })]

    #[test]
    fn appended_elements_never_straddle_or_overlap(elements in elements()) {
        let mut builder = ConstantBufferLayout::builder();
        for (i, (format, size)) in elements.iter().enumerate() {
            builder.append_array(&format!("e{i}"), *format, *size).unwrap();
        }
        let layout = builder.create_layout().unwrap();
        prop_assert_eq!(layout.len(), elements.len());

        let mut spans = Vec::new();
        for entry in layout.entries() {
            let format = entry.description.format();
            let words = format.words().unwrap();
            if entry.description.array_size().is_array() || format.is_matrix() {
                prop_assert_eq!(entry.offset % REGISTER_WORDS, 0, "{} is not register aligned", entry.description);
            } else {
                prop_assert_eq!(
                    entry.offset / REGISTER_WORDS,
                    (entry.offset + words - 1) / REGISTER_WORDS,
                    "{} straddles a register", entry.description
                );
            }
            spans.push((entry.offset, entry.offset + entry.footprint()));
        }

        spans.sort_unstable();
        for pair in spans.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].0, "overlap between {:?} and {:?}", pair[0], pair[1]);
        }

        let end = spans.iter().map(|s| s.1).max().unwrap_or(0);
        let size = layout.minimum_buffer_size();
        prop_assert_eq!(size % REGISTER_WORDS, 0);
        prop_assert!(size >= end && size < end + REGISTER_WORDS);
        prop_assert_eq!(layout.minimum_buffer_size_in_bytes(), size * 4);
    }

    #[test]
    fn explicit_offsets_reject_straddling_vectors(offset in 0u32..64) {
        let mut builder = ConstantBufferLayout::builder();
        let placed = builder.add_element("v", PinFormat::Floatx3, ArraySize::NotArray, offset);
        prop_assert_eq!(placed.is_ok(), offset % REGISTER_WORDS <= 1);
    }
}
