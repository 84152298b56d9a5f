//! Driver boundary.

/// Per-buffer exchange with the audio driver.
///
/// Each slice element is one channel. Every output vector has the device block length and
/// must be filled before returning. Implementations run on the driver thread and must not
/// block on I/O.
pub trait AudioCallback: Send + 'static {
    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]);
}

impl<F> AudioCallback for F
where
    F: FnMut(&[Vec<f32>], &mut [Vec<f32>]) + Send + 'static,
{
    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) {
        self(inputs, outputs)
    }
}
