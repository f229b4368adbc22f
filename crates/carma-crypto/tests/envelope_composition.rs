use carma_crypto::{
    anon_ciphertext_size, anon_decrypt, anon_encrypt, auth_ciphertext_size, auth_decrypt,
    auth_encrypt, psn_hash, KeyPair,
};
use carma_protocol::packet::{MbClientPacket, Packet, PacketPacket};
use carma_protocol::{Guid, PacketBody, Psn, WireParams};

#[test]
fn test_sealed_packet_size_is_known_before_encryption() {
    carma_crypto::init().unwrap();
    let params = WireParams::new(32, 4);
    let mailbox = KeyPair::generate();
    let client = KeyPair::generate();

    let packet = MbClientPacket::new(vec![0xAB; 333], Guid::generate());
    let planned = auth_ciphertext_size(packet.to_bytes_size(&params));

    let plaintext = packet.to_bytes(&params).unwrap();
    let sealed = auth_encrypt(&plaintext, &mailbox, &client.public_key).unwrap();
    assert_eq!(sealed.len(), planned);

    let opened = auth_decrypt(&sealed, &client, &mailbox.public_key).unwrap();
    assert_eq!(
        Packet::from_bytes(&opened, &params).unwrap(),
        Packet::from(packet)
    );
}

#[test]
fn test_anonymous_forwarding_layer() {
    carma_crypto::init().unwrap();
    let params = WireParams::new(32, 4);
    let relay = KeyPair::generate();

    let inner = vec![1, 2, 3, 4, 5];
    let wrapped = PacketPacket::new(Psn::from("rs-1-0"), inner.clone());
    let plaintext = wrapped.to_bytes(&params).unwrap();
    let sealed = anon_encrypt(&plaintext, &relay.public_key).unwrap();
    assert_eq!(sealed.len(), anon_ciphertext_size(plaintext.len()));

    let opened = anon_decrypt(&sealed, &relay.public_key, &relay.secret_key).unwrap();
    let decoded = PacketPacket::from_bytes(&opened, &params).unwrap();
    assert_eq!(decoded.receiver, Psn::from("rs-1-0"));
    assert_eq!(decoded.packet, inner);
}

#[test]
fn test_hash_of_receiver_is_stable_across_calls() {
    let psn = Psn::from("mb-server-7");
    assert_eq!(psn_hash(&psn), psn_hash(&psn.clone()));
}
