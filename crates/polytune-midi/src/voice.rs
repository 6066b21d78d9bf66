//! Channel-backed voice pool with least-recently-allocated stealing.

use smallvec::SmallVec;

use crate::Channel;

/// Two cents offsets closer than this share a channel.
pub const CENTS_EPSILON: f64 = 1e-6;

/// Index of a voice inside its [`VoiceAllocator`].
pub type VoiceId = usize;

/// Recency of a voice, ordered from most to least eligible for stealing.
///
/// Stamps come from the allocation counter. Every expired voice sorts before
/// every active one, and within each group an older stamp sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Recency {
    Expired(u64),
    Active(u64),
}

#[derive(Debug, Clone)]
pub struct Voice {
    channel: Channel,
    cents: Option<f64>,
    recency: Recency,
}

impl Voice {
    fn new(channel: Channel) -> Self {
        Self {
            channel,
            cents: None,
            recency: Recency::Expired(0),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Cents offset currently programmed into the channel's pitch bend.
    pub fn cents(&self) -> Option<f64> {
        self.cents
    }

    pub fn recency(&self) -> Recency {
        self.recency
    }

    fn matches(&self, cents: f64) -> bool {
        self.cents
            .map_or(false, |current| (current - cents).abs() < CENTS_EPSILON)
    }
}

/// Outcome of an allocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Allocation {
    /// A voice already bent to the requested offset was picked up.
    Reused(VoiceId),
    /// The stalest voice was retuned. `previous` is the offset it carried.
    Stolen {
        voice: VoiceId,
        previous: Option<f64>,
    },
}

impl Allocation {
    pub fn voice(&self) -> VoiceId {
        match *self {
            Allocation::Reused(voice) => voice,
            Allocation::Stolen { voice, .. } => voice,
        }
    }
}

/// Fixed pool of voices, one per configured channel.
#[derive(Debug, Clone, Default)]
pub struct VoiceAllocator {
    voices: SmallVec<[Voice; 16]>,
    clock: u64,
}

impl VoiceAllocator {
    /// Create a pool owning the given channels, in order.
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            voices: channels.into_iter().map(Voice::new).collect(),
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(id)
    }

    /// Pick a voice for a note detuned by `cents`.
    ///
    /// Returns `None` only when the pool is empty.
    pub fn allocate(&mut self, cents: f64) -> Option<Allocation> {
        if self.voices.is_empty() {
            return None;
        }
        self.clock += 1;
        let stamp = Recency::Active(self.clock);

        if let Some((id, voice)) = self
            .voices
            .iter_mut()
            .enumerate()
            .find(|(_, voice)| voice.matches(cents))
        {
            voice.recency = stamp;
            return Some(Allocation::Reused(id));
        }

        let (id, voice) = self
            .voices
            .iter_mut()
            .enumerate()
            .min_by_key(|(_, voice)| voice.recency)?;
        let previous = voice.cents.replace(cents);
        voice.recency = stamp;
        Some(Allocation::Stolen {
            voice: id,
            previous,
        })
    }

    /// Mark a voice as finished so it is the first candidate for stealing.
    pub fn expire(&mut self, id: VoiceId) {
        if let Some(voice) = self.voices.get_mut(id) {
            voice.recency = Recency::Expired(self.clock);
        }
    }

    /// Voice that the next non-matching allocation would steal.
    pub fn next_victim(&self) -> Option<VoiceId> {
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, voice)| voice.recency)
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_never_allocates() {
        let mut pool = VoiceAllocator::new([]);
        assert!(pool.allocate(0.0).is_none());
    }

    #[test]
    fn fresh_voices_are_used_in_channel_order() {
        let mut pool = VoiceAllocator::new([3, 5, 7]);
        let ids: Vec<_> = [10.0, 20.0, 30.0]
            .into_iter()
            .map(|cents| pool.allocate(cents).unwrap().voice())
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(pool.voice(2).unwrap().channel(), 7);
    }

    #[test]
    fn matching_offset_reuses_voice() {
        let mut pool = VoiceAllocator::new([0, 1]);
        let first = pool.allocate(12.5).unwrap();
        let second = pool.allocate(12.5 + CENTS_EPSILON / 2.0).unwrap();
        assert!(matches!(first, Allocation::Stolen { .. }));
        assert_eq!(second, Allocation::Reused(first.voice()));
    }

    #[test]
    fn distinct_offset_takes_another_voice() {
        let mut pool = VoiceAllocator::new([0, 1]);
        let first = pool.allocate(12.5).unwrap().voice();
        let second = pool.allocate(12.5 + 1e-3).unwrap().voice();
        assert_ne!(first, second);
    }

    #[test]
    fn steals_least_recently_allocated() {
        let mut pool = VoiceAllocator::new([0, 1, 2]);
        pool.allocate(1.0);
        pool.allocate(2.0);
        pool.allocate(3.0);
        // Touch the first voice so the second becomes the oldest.
        assert_eq!(pool.allocate(1.0), Some(Allocation::Reused(0)));
        let stolen = pool.allocate(4.0).unwrap();
        assert_eq!(
            stolen,
            Allocation::Stolen {
                voice: 1,
                previous: Some(2.0)
            }
        );
    }

    #[test]
    fn expired_voice_is_stolen_first() {
        let mut pool = VoiceAllocator::new([0, 1, 2]);
        pool.allocate(1.0);
        pool.allocate(2.0);
        pool.allocate(3.0);
        pool.expire(2);
        assert_eq!(pool.next_victim(), Some(2));
        assert_eq!(pool.allocate(4.0).unwrap().voice(), 2);
    }

    #[test]
    fn earlier_expiry_is_preferred() {
        let mut pool = VoiceAllocator::new([0, 1, 2]);
        pool.allocate(1.0);
        pool.allocate(2.0);
        pool.expire(1);
        pool.allocate(3.0);
        pool.expire(0);
        assert_eq!(pool.next_victim(), Some(1));
    }

    #[test]
    fn expired_voice_with_matching_offset_is_revived() {
        let mut pool = VoiceAllocator::new([0, 1]);
        let id = pool.allocate(-20.0).unwrap().voice();
        pool.expire(id);
        assert_eq!(pool.allocate(-20.0), Some(Allocation::Reused(id)));
        assert!(matches!(
            pool.voice(id).unwrap().recency(),
            Recency::Active(_)
        ));
    }
}
