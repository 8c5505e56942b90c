use std::error::Error;
use std::fs;
use std::process::{Command, Output};
use tempfile::tempdir;

fn bitcrypt_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bitcrypt"))
}

fn run(args: &[&str]) -> Result<Output, Box<dyn Error>> {
    Ok(bitcrypt_command().args(args).output()?)
}

#[test]
fn version_flag_prints_build_information() -> Result<(), Box<dyn Error>> {
    let output = run(&["--version"])?;
    assert!(
        output.status.success(),
        "version command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout)?;
    assert!(
        stdout.starts_with("bitcrypt "),
        "unexpected version line: {}",
        stdout
    );
    assert!(
        stdout.contains("build"),
        "version output should include build value: {}",
        stdout
    );
    Ok(())
}

#[test]
fn running_without_subcommand_displays_help() -> Result<(), Box<dyn Error>> {
    let output = bitcrypt_command().output()?;
    assert!(
        output.status.success(),
        "help output failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Usage: bitcrypt"),
        "help output missing usage: {}",
        stdout
    );
    assert!(
        stdout.contains("Commands:"),
        "help output missing command list: {}",
        stdout
    );
    Ok(())
}

#[test]
fn cli_encrypt_decrypt_round_trip() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let key = dir.path().join("secret.key");
    let target = dir.path().join("letter.txt");
    fs::write(&key, b"a fairly short key")?;
    fs::write(&target, b"Attack at dawn. Bring snacks.")?;

    let encrypt = run(&[
        "encrypt",
        "--key-file",
        key.to_str().unwrap(),
        target.to_str().unwrap(),
    ])?;
    assert!(
        encrypt.status.success(),
        "encrypt command failed: {}",
        String::from_utf8_lossy(&encrypt.stderr)
    );

    let bit = dir.path().join("letter.txt.bit");
    assert!(bit.exists(), "encrypted twin should replace the source");
    assert!(!target.exists(), "plaintext should be shredded and removed");
    assert_ne!(fs::read(&bit)?, b"Attack at dawn. Bring snacks.".to_vec());

    let decrypt = run(&[
        "encrypt",
        "--key-file",
        key.to_str().unwrap(),
        bit.to_str().unwrap(),
    ])?;
    assert!(
        decrypt.status.success(),
        "decrypt command failed: {}",
        String::from_utf8_lossy(&decrypt.stderr)
    );

    assert_eq!(fs::read(&target)?, b"Attack at dawn. Bring snacks.");
    assert!(!bit.exists(), "decryption should consume the .bit file");
    Ok(())
}

#[test]
fn cli_encrypt_with_missing_key_fails() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let target = dir.path().join("data.txt");
    fs::write(&target, b"payload")?;

    let output = run(&[
        "encrypt",
        "--key-file",
        dir.path().join("no-such.key").to_str().unwrap(),
        target.to_str().unwrap(),
    ])?;
    assert!(!output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("Error: reading key"),
        "stderr should name the key failure: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(fs::read(&target)?, b"payload");
    Ok(())
}

#[test]
fn cli_write_and_verify_key_on_an_image() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let image = dir.path().join("stick.img");
    let key = dir.path().join("device.key");
    fs::write(&image, vec![0u8; 64 * 1024])?;
    let key_bytes: Vec<u8> = (0..700u32).map(|i| (i % 251) as u8).collect();
    fs::write(&key, &key_bytes)?;

    let write = run(&[
        "write-key",
        "--key-file",
        key.to_str().unwrap(),
        image.to_str().unwrap(),
        "--first",
        "0:31",
        "--second",
        "64:95",
    ])?;
    assert!(
        write.status.success(),
        "write-key command failed: {}",
        String::from_utf8_lossy(&write.stderr)
    );
    assert!(
        String::from_utf8(write.stdout.clone())?.contains("Key written"),
        "write-key output missing confirmation"
    );

    let verify = run(&[
        "verify-key",
        image.to_str().unwrap(),
        "--first",
        "0:31",
        "--second",
        "64:95",
        "--key-file",
        key.to_str().unwrap(),
    ])?;
    assert!(
        verify.status.success(),
        "verify-key command failed: {}",
        String::from_utf8_lossy(&verify.stderr)
    );
    assert!(
        String::from_utf8(verify.stdout)?.contains("Regions match over 700 bytes"),
        "verify-key should report the compared length"
    );

    // Flip one byte inside the second copy.
    let mut bytes = fs::read(&image)?;
    bytes[32 * 1024 + 5] ^= 0x01;
    fs::write(&image, &bytes)?;

    let corrupted = run(&[
        "verify-key",
        image.to_str().unwrap(),
        "--first",
        "0:31",
        "--second",
        "64:95",
        "--length",
        "700",
    ])?;
    assert!(
        !corrupted.status.success(),
        "corrupted regions must fail verification"
    );
    assert!(
        String::from_utf8(corrupted.stdout)?.contains("Regions differ at byte 5"),
        "verify-key should report the first differing byte"
    );
    Ok(())
}

#[test]
fn cli_read_device_dumps_sectors() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let image = dir.path().join("disk.img");
    let mut bytes = vec![0u8; 4 * 512];
    for (i, b) in bytes.iter_mut().take(16).enumerate() {
        *b = i as u8;
    }
    bytes[3 * 512] = 0xEE;
    fs::write(&image, &bytes)?;

    let head = run(&["read-device", image.to_str().unwrap(), "--length", "16"])?;
    assert!(
        head.status.success(),
        "read-device failed: {}",
        String::from_utf8_lossy(&head.stderr)
    );
    let stdout = String::from_utf8(head.stdout)?;
    assert_eq!(
        stdout.trim_end(),
        "00000000  000102030405060708090a0b0c0d0e0f"
    );

    let tail = run(&[
        "read-device",
        image.to_str().unwrap(),
        "--lba",
        "-1",
        "--length",
        "16",
    ])?;
    assert!(tail.status.success());
    let stdout = String::from_utf8(tail.stdout)?;
    assert!(
        stdout.starts_with("00000600  ee"),
        "unexpected tail dump: {}",
        stdout
    );
    Ok(())
}
