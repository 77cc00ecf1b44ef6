mod opt;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::warn;

use syxmem::catalog::{self, Device, MemoryStore, ParseOptions};
use syxmem::memory::{DeviceMemoryDumper, YamlLibrary};
use syxmem::proto::{IdentityRequest, Outgoing, SysExParser, SysExTemplate};
use syxmem::seven_bit::{PackedInt24, U7};

struct App {
    options: ParseOptions,
    library: Option<PathBuf>,
}

impl App {
    fn new(options: ParseOptions, library: Option<PathBuf>) -> Self {
        Self { options, library }
    }

    fn store(&self) -> MemoryStore {
        match YamlLibrary::discover(self.library.as_deref()) {
            Ok(library) => MemoryStore::new(library),
            Err(err) => {
                warn!(%err, "memory maps unavailable, nothing will be stored");
                MemoryStore::default()
            }
        }
    }

    fn device(manufacturer: &str, model: &str, device_id: u8) -> Result<Device> {
        catalog::find_device(manufacturer, model)
            .map(|device| device.with_device_id(U7::new(device_id)))
            .ok_or_else(|| anyhow!("unknown device {manufacturer} {model}"))
    }

    fn parse(&self, file: &Path, dump: Option<&Path>) -> Result<()> {
        let mut store = self.store();
        let report = SysExParser::new(self.options.clone())
            .parse_file(file, &mut store)
            .with_context(|| format!("could not read {file:?}"))?;

        println!("{} frames, {} rejected", report.frames, report.errors.len());
        for identity in &report.identities {
            match identity.details {
                Some(details) => println!(
                    "Identity: {} family {:04X} member {:04X} version {:?}",
                    identity.manufacturer.name(),
                    details.family,
                    details.member,
                    details.version
                ),
                None => println!("Identity: {}", identity.manufacturer.name()),
            }
        }
        for error in &report.errors {
            println!("  {error}");
        }

        for (_, memory) in store.memories() {
            DeviceMemoryDumper::new(memory).dump_memory_map(io::stdout().lock())?;
        }

        if let Some(path) = dump {
            let mut out = BufWriter::new(File::create(path)?);
            for (_, memory) in store.memories() {
                DeviceMemoryDumper::new(memory).dump_memory(&mut out)?;
            }
            out.flush()?;
            println!("Wrote memory dump to {path:?}");
        }

        Ok(())
    }

    fn request(
        manufacturer: &str,
        model: &str,
        address: PackedInt24,
        size: PackedInt24,
        device_id: u8,
    ) -> Result<()> {
        let event = Self::device(manufacturer, model, device_id)?.request_data(address, size)?;
        println!("{event}");
        Ok(())
    }

    fn write(manufacturer: &str, model: &str, address: PackedInt24, data: &[u8], device_id: u8) -> Result<()> {
        let event = Self::device(manufacturer, model, device_id)?.send_data(address, data)?;
        println!("{event}");
        Ok(())
    }

    fn template(text: &str) -> Result<()> {
        for event in SysExTemplate::parse(text)?.events()? {
            println!("{event}");
        }
        Ok(())
    }

    fn list_devices(all: bool) {
        for manufacturer in catalog::MANUFACTURERS {
            let supported = manufacturer.protocol().is_some();
            if !supported && !all {
                continue;
            }
            println!("{:>8}: {}", manufacturer.id().to_string(), manufacturer.name());
            for model in manufacturer.devices() {
                println!("          {:02X} {}", model.code(), model.name());
            }
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let opts = opt::Opts::parse();
    let app = App::new(
        ParseOptions {
            force_device: opts.force_device,
        },
        opts.library,
    );

    match opts.cmd {
        opt::Operation::Parse { file, dump } => app.parse(&file, dump.as_deref())?,
        opt::Operation::Request {
            manufacturer,
            device,
            address,
            size,
            device_id,
        } => App::request(&manufacturer, &device, address, size, device_id)?,
        opt::Operation::Write {
            manufacturer,
            device,
            address,
            bytes,
            device_id,
        } => App::write(&manufacturer, &device, address, &bytes, device_id)?,
        opt::Operation::Identity { channel } => {
            let event = IdentityRequest {
                channel: U7::new(channel),
            }
            .to_event()?;
            println!("{event}");
        }
        opt::Operation::Template { text } => App::template(&text)?,
        opt::Operation::Devices { all } => App::list_devices(all),
    }

    Ok(())
}
