//! Generic hook sets that are not tied to a single game.

use super::Hooks;

/// Identity hook set
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl Hooks for NoHooks {}

/// Swaps every 16-bit word on load and again on save, for consoles whose
/// dumps store words in the opposite order to what the game reads (N64
/// `.n64` images, some flash saves). A trailing odd byte is left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteSwap16;

fn swap_words(mut buffer: Vec<u8>) -> Vec<u8> {
    for pair in buffer.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
    buffer
}

impl Hooks for ByteSwap16 {
    fn before_init_data_view(&self, buffer: Vec<u8>) -> Vec<u8> {
        swap_words(buffer)
    }

    fn before_saving(&self, buffer: Vec<u8>) -> Vec<u8> {
        swap_words(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byteswap_is_self_inverse() {
        let hooks = ByteSwap16;
        let original = vec![0x12, 0x34, 0x56, 0x78, 0x9a];
        let loaded = hooks.before_init_data_view(original.clone());
        assert_eq!(loaded, [0x34, 0x12, 0x78, 0x56, 0x9a]);
        assert_eq!(hooks.before_saving(loaded), original);
    }
}
