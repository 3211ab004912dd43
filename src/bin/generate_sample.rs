use std::sync::Arc;

use arrow::array::{Float64Builder, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// How one synthetic feature behaves across subjects and devices.  The
/// device spread drives the between-device variance, so it controls how
/// high the fitted ICC comes out.
struct FeatureProfile {
    name: &'static str,
    base: f64,
    subject_sd: f64,
    device_spread: f64,
    noise_sd: f64,
    /// Leave the whole transverse partition empty for this feature.
    absent_in_transverse: bool,
}

const DEVICES: [char; 3] = ['F', 'S', 'X'];
const SECTIONS: [char; 2] = ['L', 'T'];
const SUBJECTS: usize = 20;

/// Fraction of feature cells dropped at random, on top of the structural
/// gaps above.
const MISSING_RATE: f64 = 0.03;

fn profiles() -> Vec<FeatureProfile> {
    vec![
        FeatureProfile {
            name: "original_shape_VoxelVolume",
            base: 1500.0,
            subject_sd: 300.0,
            device_spread: 40.0,
            noise_sd: 20.0,
            absent_in_transverse: false,
        },
        FeatureProfile {
            name: "original_firstorder_Mean",
            base: 80.0,
            subject_sd: 4.0,
            device_spread: 15.0,
            noise_sd: 1.0,
            absent_in_transverse: false,
        },
        FeatureProfile {
            name: "original_firstorder_Entropy",
            base: 4.5,
            subject_sd: 0.4,
            device_spread: 0.25,
            noise_sd: 0.05,
            absent_in_transverse: false,
        },
        FeatureProfile {
            name: "original_glcm_Contrast",
            base: 60.0,
            subject_sd: 10.0,
            device_spread: 8.0,
            noise_sd: 3.0,
            absent_in_transverse: false,
        },
        FeatureProfile {
            name: "original_glrlm_GrayLevelNonUniformity",
            base: 220.0,
            subject_sd: 40.0,
            device_spread: 0.0,
            noise_sd: 10.0,
            absent_in_transverse: true,
        },
    ]
}

fn main() {
    let mut rng = SimpleRng::new(42);
    let profiles = profiles();

    // Fixed per-feature effects, drawn once so every sample of a device
    // shares the same systematic offset.
    let device_offsets: Vec<Vec<f64>> = profiles
        .iter()
        .map(|p| DEVICES.iter().map(|_| rng.gauss(0.0, p.device_spread)).collect())
        .collect();
    let subject_baselines: Vec<Vec<f64>> = profiles
        .iter()
        .map(|p| (0..SUBJECTS).map(|_| rng.gauss(p.base, p.subject_sd)).collect())
        .collect();

    // Collect all rows
    let mut all_index: Vec<i64> = Vec::new();
    let mut all_image: Vec<String> = Vec::new();
    let mut all_mask: Vec<String> = Vec::new();
    let mut all_name: Vec<String> = Vec::new();
    let mut feature_cells: Vec<Vec<Option<f64>>> = profiles.iter().map(|_| Vec::new()).collect();

    let mut row_id: i64 = 0;
    for subject in 0..SUBJECTS {
        for &section in &SECTIONS {
            for (device_idx, &device) in DEVICES.iter().enumerate() {
                let name = format!("P{:02}_{device}_{section}", subject + 1);
                all_index.push(row_id);
                all_image.push(format!("images/{name}.nrrd"));
                all_mask.push(format!("masks/{name}_seg.nrrd"));
                all_name.push(name);
                row_id += 1;

                for (feature_idx, profile) in profiles.iter().enumerate() {
                    let cell = if profile.absent_in_transverse && section == 'T' {
                        None
                    } else if rng.next_f64() < MISSING_RATE {
                        None
                    } else {
                        let value = subject_baselines[feature_idx][subject]
                            + device_offsets[feature_idx][device_idx]
                            + rng.gauss(0.0, profile.noise_sd);
                        Some(value)
                    };
                    feature_cells[feature_idx].push(cell);
                }
            }
        }
    }

    // Build Arrow arrays
    let index_array = Int64Array::from(all_index);
    let image_array = StringArray::from(all_image.iter().map(|s| s.as_str()).collect::<Vec<_>>());
    let mask_array = StringArray::from(all_mask.iter().map(|s| s.as_str()).collect::<Vec<_>>());
    let name_array = StringArray::from(all_name.iter().map(|s| s.as_str()).collect::<Vec<_>>());

    let mut fields = vec![
        Field::new("Index", DataType::Int64, false),
        Field::new("Image", DataType::Utf8, false),
        Field::new("Mask", DataType::Utf8, false),
        Field::new("Name", DataType::Utf8, false),
    ];
    let mut columns: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(index_array),
        Arc::new(image_array),
        Arc::new(mask_array),
        Arc::new(name_array),
    ];

    for (profile, cells) in profiles.iter().zip(feature_cells) {
        let mut builder = Float64Builder::new();
        for cell in cells {
            builder.append_option(cell);
        }
        fields.push(Field::new(profile.name, DataType::Float64, true));
        columns.push(Arc::new(builder.finish()));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).expect("Failed to create RecordBatch");

    // Write Parquet
    let output_path = "sample_measurements.parquet";
    let file = std::fs::File::create(output_path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");

    println!(
        "Wrote {} samples ({} features) to {output_path}",
        row_id,
        profiles.len()
    );
}
