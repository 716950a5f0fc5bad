use super::spectral::{power_to_db, MelFilterbank, Spectrogram};

/// Mel-frequency cepstral coefficients, one row of `n_mfcc` per frame.
///
/// Log-mel power (dB, reference 1.0) followed by an orthonormal DCT-II.
pub fn mfcc(spectrogram: &Spectrogram, filterbank: &MelFilterbank, n_mfcc: usize) -> Vec<Vec<f32>> {
    let mut mel = filterbank.apply_all(spectrogram);
    power_to_db(&mut mel, 1.0);

    let basis = dct_basis(filterbank.num_bands(), n_mfcc);
    mel.iter()
        .map(|frame| {
            basis
                .iter()
                .map(|row| row.iter().zip(frame).map(|(b, x)| b * x).sum())
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II basis, `n_out` rows of length `n_in`.
fn dct_basis(n_in: usize, n_out: usize) -> Vec<Vec<f32>> {
    let n = n_in as f32;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            (0..n_in)
                .map(|i| {
                    scale
                        * (std::f32::consts::PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n))
                            .cos()
                })
                .collect()
        })
        .collect()
}
