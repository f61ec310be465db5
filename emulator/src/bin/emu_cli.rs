
use std::error::Error;
use std::path::PathBuf;

use common::mem::{as_byte_slice, words_from_bytes};
use emu_lib::Emulator;
use emu_lib::io::console::Console;
use emu_lib::io::disk::Disk;

use clap::Parser;
use log::info;


/// 16-bit minicomputer emulator
#[derive(Parser)]
struct Args {
    /// Core image to load, as host-order 16-bit words
    image: PathBuf,

    /// Word address at which to load the image
    #[arg(long, default_value_t = 0)]
    load_addr: u16,

    /// Address at which to start executing
    #[arg(long, default_value_t = 0)]
    start: u16,

    /// Stop after this many instructions even if the machine hasn't waited
    #[arg(long)]
    max_ins: Option<usize>,

    /// Cartridge image for drive 0; written back on exit
    #[arg(long)]
    disk: Option<PathBuf>,

    /// Print the registers when execution stops
    #[arg(long)]
    dump: bool,
}


fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let opt = Args::parse();

    let mut emu = Emulator::new();
    emu.add_device(Console::default());

    let disk = match &opt.disk {
        Some(path) => {
            let words = words_from_bytes(&std::fs::read(path)?);
            let disk = std::sync::Arc::new(std::sync::Mutex::new(Disk::with_cartridge(0, words)?));
            emu.add_shared_device(disk.clone());
            Some((path, disk))
        }
        None => None,
    };

    let image = words_from_bytes(&std::fs::read(&opt.image)?);
    emu.load_image(&image, opt.load_addr);
    info!("Loaded {} words at {:#06x}", image.len(), opt.load_addr);

    emu.set_iar(opt.start);
    emu.reset_wait();
    match opt.max_ins {
        Some(max) => {
            emu.run_for(max);
        }
        None => emu.run(),
    }

    if let Some((path, disk)) = disk {
        let disk = disk.lock().map_err(|e| e.to_string())?;
        std::fs::write(path, as_byte_slice(disk.cartridge()))?;
    }

    if opt.dump {
        let state = emu.get_state();
        eprintln!("{state}");
    }

    Ok(())
}
