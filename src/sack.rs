use crate::seq::Seq;
use anyhow::bail;
use bytes::{Buf, BufMut};

/// A selective acknowledgment: the cumulative ack travels in the packet
/// header's `seq` field, and the payload is a bitmap of up to eight bytes
/// where bit `i` of byte `j` marks `cum_ack + 1 + 8*j + i`.
///
/// An empty bitmap is valid and conveys only the cumulative ack.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SackFrame {
    /// every sequence number at or (modularly) below this one is acknowledged
    pub cum_ack: Seq,
    pub bitmap: Vec<u8>,
}

impl SackFrame {
    pub const MAX_BITMAP_BYTES: usize = 8;

    /// Build the SACK describing a receiver's current state: everything below
    /// `next_expected` is cumulatively acknowledged, and each buffered
    /// out-of-order sequence within `sack_width` of it gets a bitmap bit.
    /// Buffered sequences beyond the bitmap width are silently left for a
    /// later SACK.
    pub fn for_buffered(next_expected: Seq, buffered: impl Iterator<Item = Seq>, sack_width: u16) -> SackFrame {
        let mut bitmap = [0u8; Self::MAX_BITMAP_BYTES];
        let mut highest_byte = 0usize;

        for seq in buffered {
            let offset = next_expected.distance_to(seq);
            if offset >= sack_width {
                continue;
            }
            let byte = offset as usize / 8;
            bitmap[byte] |= 1 << (offset % 8);
            if byte + 1 > highest_byte {
                highest_byte = byte + 1;
            }
        }

        SackFrame {
            cum_ack: next_expected.prev(),
            bitmap: bitmap[..highest_byte].to_vec(),
        }
    }

    pub fn ser_payload(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.bitmap);
    }

    pub fn deser_payload(cum_ack: Seq, buf: &mut impl Buf) -> anyhow::Result<SackFrame> {
        if buf.remaining() > Self::MAX_BITMAP_BYTES {
            bail!("SACK bitmap of {} bytes exceeds the maximum of {}", buf.remaining(), Self::MAX_BITMAP_BYTES);
        }

        let mut bitmap = vec![0u8; buf.remaining()];
        buf.copy_to_slice(&mut bitmap);

        Ok(SackFrame { cum_ack, bitmap })
    }

    /// the sequences marked in the bitmap (the cumulative range is not
    /// enumerated - it is unbounded below)
    pub fn bitmap_acked(&self) -> impl Iterator<Item = Seq> + '_ {
        let base = self.cum_ack.next();
        self.bitmap.iter().enumerate().flat_map(move |(j, &byte)| {
            (0..8u16)
                .filter(move |i| byte & (1 << i) != 0)
                .map(move |i| base.plus(8 * j as u16 + i))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty(5, vec![], vec![])]
    #[case::single(5, vec![6], vec![0b0000_0010])]
    #[case::two_in_one_byte(5, vec![6, 8], vec![0b0000_1010])]
    #[case::second_byte(5, vec![13], vec![0, 0b0000_0001])]
    #[case::spread(5, vec![6, 12, 20], vec![0b1000_0010, 0b1000_0000])]
    #[case::last_in_width(5, vec![68], vec![0,0,0,0,0,0,0, 0b1000_0000])]
    #[case::beyond_width_dropped(5, vec![69], vec![])]
    #[case::wrap(0xFFFE, vec![0xFFFF, 1], vec![0b0000_1010])]
    fn test_for_buffered(#[case] next_expected: u16, #[case] buffered: Vec<u16>, #[case] expected_bitmap: Vec<u8>) {
        let sack = SackFrame::for_buffered(
            Seq::from_raw(next_expected),
            buffered.into_iter().map(Seq::from_raw),
            64,
        );
        assert_eq!(sack.cum_ack, Seq::from_raw(next_expected.wrapping_sub(1)));
        assert_eq!(sack.bitmap, expected_bitmap);
    }

    #[rstest]
    #[case::empty(4, vec![], vec![])]
    #[case::first(4, vec![0b0000_0001], vec![5])]
    #[case::one_byte(4, vec![0b0000_1001], vec![5, 8])]
    #[case::two_bytes(4, vec![0b1000_0010, 0b1000_0000], vec![6, 12, 20])]
    #[case::wrap(0xFFFD, vec![0b0000_1001], vec![0xFFFE, 1])]
    fn test_bitmap_acked(#[case] cum_ack: u16, #[case] bitmap: Vec<u8>, #[case] expected: Vec<u16>) {
        let sack = SackFrame { cum_ack: Seq::from_raw(cum_ack), bitmap };
        let acked = sack.bitmap_acked().collect::<Vec<_>>();
        let expected = expected.into_iter().map(Seq::from_raw).collect::<Vec<_>>();
        assert_eq!(acked, expected);
    }

    #[test]
    fn test_deser_rejects_oversized_bitmap() {
        let payload = [0u8; 9];
        assert!(SackFrame::deser_payload(Seq::ZERO, &mut payload.as_slice()).is_err());
    }

    #[test]
    fn test_payload_roundtrip() {
        let sack = SackFrame { cum_ack: Seq::from_raw(42), bitmap: vec![0b101, 0b1] };

        let mut buf = Vec::new();
        sack.ser_payload(&mut buf);

        let parsed = SackFrame::deser_payload(Seq::from_raw(42), &mut buf.as_slice()).unwrap();
        assert_eq!(parsed, sack);
    }
}
