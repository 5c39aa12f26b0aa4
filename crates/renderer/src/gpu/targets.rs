use super::texture::Texture;

/// Two render targets of identical size that trade places after every
/// sample: `front` holds the last finished frame, `back` receives the next.
pub(crate) struct PingPong {
    targets: [Texture; 2],
    front: usize,
}

impl PingPong {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, float: bool) -> Self {
        tracing::debug!(width, height, float, "allocating ping-pong targets");
        Self {
            targets: [
                Texture::render_target(device, "ping-pong target 0", width, height, float),
                Texture::render_target(device, "ping-pong target 1", width, height, float),
            ],
            front: 0,
        }
    }

    pub fn front(&self) -> &Texture {
        &self.targets[self.front]
    }

    pub fn back(&self) -> &Texture {
        &self.targets[1 - self.front]
    }

    /// Index of the front texture, used to pick the matching bind group.
    pub fn parity(&self) -> usize {
        self.front
    }

    pub fn get(&self, index: usize) -> &Texture {
        &self.targets[index % 2]
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }
}
