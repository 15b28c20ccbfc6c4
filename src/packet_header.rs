use crate::seq::Seq;
use anyhow::bail;
use bytes::{Buf, BufMut};

/// The channel tag in the first header byte. Unknown tags cause the whole
/// frame to be dropped.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Channel {
    ReliableData,
    Unreliable,
    Sack,
}

impl Channel {
    const TAG_RELIABLE_DATA: u8 = 0x01;
    const TAG_UNRELIABLE: u8 = 0x02;
    const TAG_SACK: u8 = 0x03;

    fn tag(&self) -> u8 {
        match self {
            Channel::ReliableData => Self::TAG_RELIABLE_DATA,
            Channel::Unreliable => Self::TAG_UNRELIABLE,
            Channel::Sack => Self::TAG_SACK,
        }
    }
}

/// The fixed seven-byte header preceding every frame's payload.
///
/// The `seq` field is overloaded by channel: the reliable sequence number for
/// data frames, the wrapping emission counter for unreliable frames, and the
/// cumulative ack for SACK frames.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct PacketHeader {
    pub channel: Channel,
    pub seq: Seq,
    /// sender's monotonic clock at emission, milliseconds truncated to 32 bits
    pub ts_ms: u32,
}

impl PacketHeader {
    pub const SERIALIZED_LEN: usize = 7;

    pub fn new(channel: Channel, seq: Seq, ts_ms: u32) -> PacketHeader {
        PacketHeader { channel, seq, ts_ms }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.channel.tag());
        buf.put_u16(self.seq.to_raw());
        buf.put_u32(self.ts_ms);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<PacketHeader> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("frame too short for a packet header: {} bytes", buf.remaining());
        }

        let channel = match buf.get_u8() {
            Channel::TAG_RELIABLE_DATA => Channel::ReliableData,
            Channel::TAG_UNRELIABLE => Channel::Unreliable,
            Channel::TAG_SACK => Channel::Sack,
            tag => bail!("unknown channel tag {:#04x}", tag),
        };
        let seq = Seq::from_raw(buf.get_u16());
        let ts_ms = buf.get_u32();

        Ok(PacketHeader { channel, seq, ts_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::reliable(Channel::ReliableData, 0, 0, vec![1, 0,0, 0,0,0,0])]
    #[case::reliable_values(Channel::ReliableData, 0x1234, 0xAABBCCDD, vec![1, 0x12,0x34, 0xAA,0xBB,0xCC,0xDD])]
    #[case::unreliable(Channel::Unreliable, 7, 1000, vec![2, 0,7, 0,0,3,0xE8])]
    #[case::sack(Channel::Sack, 0xFFFF, 5, vec![3, 0xFF,0xFF, 0,0,0,5])]
    fn test_ser(#[case] channel: Channel, #[case] seq: u16, #[case] ts_ms: u32, #[case] expected: Vec<u8>) {
        let mut buf = Vec::new();
        PacketHeader::new(channel, Seq::from_raw(seq), ts_ms).ser(&mut buf);
        assert_eq!(buf, expected);
    }

    #[rstest]
    #[case::reliable(vec![1, 0x12,0x34, 0xAA,0xBB,0xCC,0xDD], Channel::ReliableData, 0x1234, 0xAABBCCDD)]
    #[case::unreliable(vec![2, 0,7, 0,0,3,0xE8], Channel::Unreliable, 7, 1000)]
    #[case::sack(vec![3, 0xFF,0xFF, 0,0,0,5], Channel::Sack, 0xFFFF, 5)]
    fn test_deser(#[case] bytes: Vec<u8>, #[case] channel: Channel, #[case] seq: u16, #[case] ts_ms: u32) {
        let header = PacketHeader::deser(&mut bytes.as_slice()).unwrap();
        assert_eq!(header, PacketHeader::new(channel, Seq::from_raw(seq), ts_ms));
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::truncated(vec![1, 0, 0, 0, 0, 0])]
    #[case::unknown_tag(vec![9, 0,0, 0,0,0,0])]
    #[case::zero_tag(vec![0, 0,0, 0,0,0,0])]
    fn test_deser_malformed(#[case] bytes: Vec<u8>) {
        assert!(PacketHeader::deser(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_roundtrip_leaves_payload() {
        let mut frame = Vec::new();
        PacketHeader::new(Channel::ReliableData, Seq::from_raw(3), 17).ser(&mut frame);
        frame.extend_from_slice(b"hello");

        let mut buf = frame.as_slice();
        let header = PacketHeader::deser(&mut buf).unwrap();
        assert_eq!(header.seq, Seq::from_raw(3));
        assert_eq!(buf, b"hello");
    }
}
