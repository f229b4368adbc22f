use carma_protocol::packet::*;
use carma_protocol::{ChannelId, ErrorKind, Guid, LinkAddress, Psn, PsnHash};
use num_bigint::BigUint;

fn params() -> WireParams {
    WireParams::new(24, 3)
}

fn big(n: u64) -> BigUint {
    BigUint::from(n) * BigUint::from(0x0123_4567_89AB_CDEFu64)
}

fn sample_packets() -> Vec<Packet> {
    let g = Guid::generate();
    let hash = PsnHash::from_digest(&[0xA5; 15]);
    vec![
        AddContactRequest::new(b"contact me".to_vec()).into(),
        ClientMbPacket::new(g, big(7), 130).into(),
        EndorsementRequest::new(hash, vec![1; 200], vec![], vec![9, 9]).into(),
        LinkAddressPacket::new(
            ChannelId("twoSixIndirectCpp".into()),
            LinkAddress("{\"q\":\"mb-0\"}".into()),
        )
        .into(),
        MbClientPacket::new(vec![4; 129], g + 1).into(),
        MbMcUpBundlePacket::new(vec![vec![1, 2, 3], vec![], vec![5; 300]]).into(),
        MbMcUpPacket::new(g + 2, vec![big(1), big(2), BigUint::from(0u8)]).into(),
        McLeaderInitPacket::new(g + 3, vec![g, g + 1, g + 2]).into(),
        McMbDownPacket::new(vec![8; 17], vec![6; 3], g + 4).into(),
        McVPacket::new(g + 5, vec![big(3), big(4), big(5)]).into(),
        PacketPacket::new(Psn::from("mc-leader-0"), vec![2, 0, 1]).into(),
        RegistrationComplete::new(ChannelId("chan".into()), vec![0xC0, 0x0C]).into(),
    ]
}

#[test]
fn test_catalog_covers_every_type() {
    let types: Vec<PacketType> = sample_packets().iter().map(|p| p.packet_type()).collect();
    assert_eq!(types, PacketType::ALL.to_vec());
}

#[test]
fn test_every_packet_decodes_to_itself_with_exact_size() {
    for packet in sample_packets() {
        let bytes = packet.to_bytes(&params()).unwrap();
        assert_eq!(
            bytes.len(),
            packet.to_bytes_size(&params()),
            "size of {}",
            packet.packet_type()
        );
        assert_eq!(PacketType::peek(&bytes).unwrap(), packet.packet_type());
        assert_eq!(Packet::from_bytes(&bytes, &params()).unwrap(), packet);
    }
}

#[test]
fn test_every_strict_prefix_is_corrupt() {
    for packet in sample_packets() {
        let bytes = packet.to_bytes(&params()).unwrap();
        for len in 0..bytes.len() {
            let err = Packet::from_bytes(&bytes[..len], &params()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Corrupt, "{} prefix {}", packet.packet_type(), len);
        }
    }
}

#[test]
fn test_avail_limit_is_honored() {
    let packet: Packet = MbClientPacket::new(vec![1; 10], Guid::generate()).into();
    let bytes = packet.to_bytes(&params()).unwrap();
    let mut reader = carma_protocol::Reader::with_avail(&bytes, bytes.len() - 1);
    assert!(Packet::read_from(&mut reader, &params()).is_err());

    let mut reader = carma_protocol::Reader::with_avail(&bytes, bytes.len());
    assert_eq!(Packet::read_from(&mut reader, &params()).unwrap(), packet);
    assert_eq!(reader.avail(), 0);
}

#[test]
fn test_provenance_survives_nothing_but_equality() {
    let mut packet = MbClientPacket::new(vec![1], Guid::generate());
    packet.provenance.origin_handle = Some(42);
    let bytes = packet.to_bytes(&params()).unwrap();
    let decoded = MbClientPacket::from_bytes(&bytes, &params()).unwrap();
    assert_eq!(decoded.provenance.origin_handle, None);
    assert_eq!(decoded, packet);
}
