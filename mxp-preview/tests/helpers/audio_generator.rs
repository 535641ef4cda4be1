//! Generates encoded test audio

use std::io::Cursor;

/// Stereo 16-bit sine WAV at `sample_rate`, `duration_secs` long
pub fn sine_wav(sample_rate: u32, duration_secs: f64, frequency: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let frames = (duration_secs * sample_rate as f64).round() as usize;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let phase = 2.0 * std::f32::consts::PI * frequency * t;
            let sample = (0.5 * phase.sin() * i16::MAX as f32) as i16;
            writer.write_sample(sample).unwrap();
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
