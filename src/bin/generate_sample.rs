use anyhow::{Context, Result};

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

/// Chainage index ranges carrying an injected defect on one channel.
const GAUGE_DEFECTS: [(usize, usize); 2] = [(380, 396), (1400, 1410)];
const ALIGNMENT_DEFECTS: [(usize, usize); 2] = [(720, 732), (1650, 1658)];
const TWIST_DEFECTS: [(usize, usize); 1] = [(1040, 1048)];
const UNEVENNESS_DEFECTS: [(usize, usize); 1] = [(220, 236)];
const ACC_DEFECTS: [(usize, usize); 1] = [(1820, 1826)];

fn in_any(ranges: &[(usize, usize)], i: usize) -> bool {
    ranges.iter().any(|&(lo, hi)| i >= lo && i < hi)
}

fn fmt_cell(rng: &mut SimpleRng, value: f64, missing_rate: f64) -> String {
    if rng.next_f64() < missing_rate {
        String::new()
    } else {
        format!("{value:.3}")
    }
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);
    let records = 2000;

    let output_path = "track_data.csv";
    let file = std::fs::File::create(output_path)
        .with_context(|| format!("creating {output_path}"))?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record([
        "chainage",
        "gauge",
        "alignment_left",
        "alignment_right",
        "twist",
        "cross_level",
        "unevenness_left",
        "unevenness_right",
        "vertical_acceleration",
        "lateral_acceleration",
        "rail_wear_left",
        "rail_wear_right",
        "component_condition",
    ])?;

    for i in 0..records {
        let chainage = i as f64 * 0.25;

        let gauge_offset = if in_any(&GAUGE_DEFECTS, i) { 7.5 } else { 0.0 };
        let gauge = 1435.0 + gauge_offset + rng.gauss(0.0, 1.2);

        let alignment_bump = if in_any(&ALIGNMENT_DEFECTS, i) { 10.0 } else { 0.0 };
        let alignment_left = alignment_bump + rng.gauss(0.0, 2.2);
        let alignment_right = alignment_bump * 0.6 + rng.gauss(0.0, 2.2);

        let twist_bump = if in_any(&TWIST_DEFECTS, i) { 6.5 } else { 0.0 };
        let twist = twist_bump + rng.gauss(0.0, 1.3);
        let cross_level = rng.gauss(0.0, 1.8);

        let unevenness_bump = if in_any(&UNEVENNESS_DEFECTS, i) { 8.5 } else { 0.0 };
        let unevenness_left = unevenness_bump + rng.gauss(1.0, 1.8);
        let unevenness_right = unevenness_bump + rng.gauss(1.0, 1.8);

        let acc_bump = if in_any(&ACC_DEFECTS, i) { 0.55 } else { 0.0 };
        let vertical_acceleration = (rng.gauss(0.25, 0.1) + acc_bump).abs();
        let lateral_acceleration = (rng.gauss(0.15, 0.08) + acc_bump * 0.7).abs();

        // Wear grows slowly with distance.
        let rail_wear_left = (2.0 + chainage * 0.004 + rng.gauss(0.0, 0.3)).max(0.0);
        let rail_wear_right = (2.2 + chainage * 0.0035 + rng.gauss(0.0, 0.3)).max(0.0);

        let condition = match rng.next_f64() {
            v if v < 0.02 => "",
            v if v < 0.07 => "Cracked",
            v if v < 0.25 => "Worn",
            _ => "Good",
        };

        writer.write_record([
            format!("{chainage:.2}"),
            fmt_cell(&mut rng, gauge, 0.01),
            fmt_cell(&mut rng, alignment_left, 0.01),
            fmt_cell(&mut rng, alignment_right, 0.01),
            fmt_cell(&mut rng, twist, 0.01),
            fmt_cell(&mut rng, cross_level, 0.01),
            fmt_cell(&mut rng, unevenness_left, 0.01),
            fmt_cell(&mut rng, unevenness_right, 0.01),
            fmt_cell(&mut rng, vertical_acceleration, 0.005),
            fmt_cell(&mut rng, lateral_acceleration, 0.005),
            fmt_cell(&mut rng, rail_wear_left, 0.02),
            fmt_cell(&mut rng, rail_wear_right, 0.02),
            condition.to_string(),
        ])?;
    }

    writer.flush()?;
    println!("Wrote {records} track records to {output_path}");
    Ok(())
}
