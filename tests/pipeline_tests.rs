use medimg_secure::encryption::handshake::{self, derive_key};
use medimg_secure::encryption::payload::Encryptor;
use medimg_secure::encryption::permutation::{self, seed_from_key};
use medimg_secure::packet::{self, Packet};
use medimg_secure::{image_io, open, seal, Image, ImageCipher, ImageCryptoError, ReceiverKeyPair};
use std::collections::HashSet;
use std::sync::Arc;

fn test_image(height: u16, width: u16, channels: u16) -> Image {
    let len = height as usize * width as usize * channels as usize;
    let pixels = (0..len).map(|i| ((i * 31 + i / 7) % 251) as u8).collect();
    Image::new(height, width, channels, pixels).unwrap()
}

fn test_cipher() -> ImageCipher {
    ImageCipher::new(Arc::new(ReceiverKeyPair::generate()))
}

#[test]
fn test_image_roundtrip_through_png() {
    let cipher = test_cipher();

    for channels in [1u16, 3, 4] {
        let image = test_image(12, 9, channels);
        let png = image_io::encode_png(&image).unwrap();

        let encrypted = cipher.encrypt_image(&png).unwrap();
        let decrypted_png = cipher.decrypt_image(&encrypted.packet).unwrap();
        assert_eq!(image_io::decode(&decrypted_png).unwrap(), image);

        let via_base64 = cipher.decrypt_image_base64(&encrypted.packet_base64()).unwrap();
        assert_eq!(via_base64, decrypted_png);
    }
}

#[test]
fn test_pixel_roundtrip() {
    let cipher = test_cipher();
    let image = test_image(16, 20, 3);

    let packet = cipher.seal(&image).unwrap().encode().unwrap();
    assert_eq!(cipher.open(&packet).unwrap(), image);
}

#[test]
fn test_sender_only_needs_public_key() {
    let receiver = ReceiverKeyPair::generate();
    let image = test_image(5, 5, 1);

    let packet = seal(receiver.public_key(), &image).unwrap().encode().unwrap();
    assert_eq!(open(&receiver, &packet).unwrap(), image);
}

#[test]
fn test_fresh_salt_nonce_and_ciphertext() {
    let cipher = test_cipher();
    let image = test_image(8, 8, 3);

    let first = cipher.seal(&image).unwrap();
    let second = cipher.seal(&image).unwrap();

    assert_ne!(first.salt, second.salt);
    assert_ne!(first.nonce, second.nonce);
    assert_ne!(first.sender_public, second.sender_public);
    assert_ne!(first.ciphertext, second.ciphertext);
}

#[test]
fn test_ciphertext_is_permuted_then_encrypted() {
    let secret = p256::SecretKey::random(&mut rand_core::OsRng);
    let receiver = ReceiverKeyPair::from_secret(secret.clone());
    let image = test_image(6, 6, 3);
    let packet = seal(receiver.public_key(), &image).unwrap();

    // Recompute the receiver's view step by step
    let sender_public = handshake::decode_public_key(&packet.sender_public).unwrap();
    let shared = handshake::decrypt_side(&sender_public, &secret);
    let key = derive_key(shared.raw_secret_bytes().as_slice(), &packet.salt).unwrap();
    let plaintext = Encryptor::new(&key)
        .unwrap()
        .decrypt(&packet.nonce, &packet.tag, &packet.ciphertext, &packet.shape_bytes())
        .unwrap();

    let seed = seed_from_key(&key, &packet.salt);
    assert_eq!(plaintext, permutation::permute(image.pixels(), 3, seed).unwrap());
}

#[test]
fn test_tampered_bits_fail_authentication() {
    let cipher = test_cipher();
    let image = test_image(2, 2, 3);
    let packet = cipher.seal(&image).unwrap();
    let bytes = packet.encode().unwrap();

    let nonce_start = packet::FIXED_LEN - 12 - 16 + packet.sender_public.len();
    let tampered_range = nonce_start..bytes.len();
    assert_eq!(tampered_range.len(), 12 + 16 + 12);

    for byte in tampered_range {
        for bit in 0..8 {
            let mut tampered = bytes.clone();
            tampered[byte] ^= 1 << bit;
            assert!(
                matches!(cipher.open(&tampered), Err(ImageCryptoError::AuthenticationError)),
                "flipping bit {} of byte {} was not detected", bit, byte
            );
        }
    }
}

#[test]
fn test_tampered_header_fails_authentication() {
    let cipher = test_cipher();
    let image = test_image(4, 6, 3);
    let bytes = cipher.seal(&image).unwrap().encode().unwrap();

    // Swapped height/width keeps the byte count but must not be accepted
    let mut swapped = bytes.clone();
    swapped[0..4].copy_from_slice(&[0, 6, 0, 4]);
    assert!(matches!(cipher.open(&swapped), Err(ImageCryptoError::AuthenticationError)));

    let mut salted = bytes.clone();
    salted[10] ^= 0x01;
    assert!(matches!(cipher.open(&salted), Err(ImageCryptoError::AuthenticationError)));
}

#[test]
fn test_wrong_receiver_fails_authentication() {
    let image = test_image(3, 3, 3);
    let packet = test_cipher().seal(&image).unwrap().encode().unwrap();
    assert!(matches!(
        test_cipher().open(&packet),
        Err(ImageCryptoError::AuthenticationError)
    ));
}

#[test]
fn test_declared_shape_must_match_payload() {
    let receiver = ReceiverKeyPair::generate();
    let (ephemeral, shared) = handshake::encrypt_side(receiver.public_key());
    let salt = handshake::generate_salt();
    let key = derive_key(shared.raw_secret_bytes().as_slice(), &salt).unwrap();

    // Authentic packet whose header claims more pixels than it carries
    let aad = packet::shape_bytes(4, 4, 3);
    let sealed = Encryptor::new(&key).unwrap().encrypt(&[7u8; 30], &aad).unwrap();
    let packet = Packet {
        height: 4,
        width: 4,
        channels: 3,
        salt,
        sender_public: ephemeral.encoded_public_key().unwrap(),
        nonce: sealed.nonce,
        tag: sealed.tag,
        ciphertext: sealed.ciphertext,
    };

    assert!(matches!(
        open(&receiver, &packet.encode().unwrap()),
        Err(ImageCryptoError::DimensionMismatchError(_))
    ));
}

#[test]
fn test_malformed_packets() {
    let cipher = test_cipher();
    let bytes = cipher.seal(&test_image(2, 2, 1)).unwrap().encode().unwrap();

    assert!(matches!(cipher.open(&bytes[..10]), Err(ImageCryptoError::MalformedPacketError(_))));
    assert!(matches!(cipher.open(&[]), Err(ImageCryptoError::MalformedPacketError(_))));

    let mut oversized = bytes.clone();
    oversized[22..24].copy_from_slice(&u16::MAX.to_be_bytes());
    assert!(matches!(cipher.open(&oversized), Err(ImageCryptoError::MalformedPacketError(_))));

    // Sender key replaced by bytes that are not a curve point
    let mut bad_key = bytes.clone();
    for b in &mut bad_key[24..24 + 91] {
        *b = 0xEE;
    }
    assert!(matches!(cipher.open(&bad_key), Err(ImageCryptoError::MalformedPacketError(_))));
}

#[test]
fn test_undecodable_image_input() {
    let cipher = test_cipher();
    assert!(matches!(
        cipher.encrypt_image(b"\x89PNG but not really"),
        Err(ImageCryptoError::DecodeError(_))
    ));
}

#[test]
fn test_metrics_reported_with_encryption() {
    let cipher = test_cipher();
    let image = test_image(32, 32, 3);
    let encrypted = cipher.encrypt_image(&image_io::encode_png(&image).unwrap()).unwrap();

    let metrics = encrypted.metrics;
    assert_eq!(metrics.entropy_original, metrics.entropy_permuted);
    assert!(metrics.npcr > 50.0);
    assert!(metrics.uaci > 0.0);
    assert!(metrics.ssim < 0.9);

    let report = serde_json::to_value(encrypted.report()).unwrap();
    assert!(report["encrypted_data"].is_string());
    assert!(report["metrics"]["npcr"].is_number());
}

#[test]
fn test_concurrent_calls_share_one_cipher() {
    let cipher = test_cipher();
    let image = test_image(10, 10, 3);

    let nonces: Vec<[u8; 12]> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    let packet = cipher.seal(&image).unwrap();
                    let opened = cipher.open(&packet.encode().unwrap()).unwrap();
                    assert_eq!(opened, image);
                    packet.nonce
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<_> = nonces.iter().collect();
    assert_eq!(unique.len(), nonces.len());
}

#[test]
fn test_empty_image_roundtrip() {
    let cipher = test_cipher();
    let image = Image::new(0, 0, 3, Vec::new()).unwrap();
    let packet = cipher.seal(&image).unwrap().encode().unwrap();
    assert_eq!(cipher.open(&packet).unwrap(), image);
}

#[test]
fn test_wide_pixels_open_but_have_no_png_form() {
    let cipher = test_cipher();
    let image = test_image(3, 4, 5);
    let packet = cipher.seal(&image).unwrap().encode().unwrap();

    assert_eq!(cipher.open(&packet).unwrap(), image);
    assert!(matches!(
        cipher.decrypt_image(&packet),
        Err(ImageCryptoError::EncodeError(_))
    ));
}
