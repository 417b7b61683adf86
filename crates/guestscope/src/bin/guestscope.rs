//! guestscope CLI — page tables, GDT and IDT of a guest memory dump

use clap::{Args, Parser, Subcommand, ValueEnum};
use guestscope::compact::{compact, CompactedRun};
use guestscope::config::{ConfigError, MmuConfig, DEFAULT_PHYSICAL_BITS};
use guestscope::gdt::{Gdt, TableError};
use guestscope::idt::{GateDescriptor, Idt};
use guestscope::linear::LinearReader;
use guestscope::memory::{GuestImage, MemoryError};
use guestscope::mmu::{Mmu, TranslationError};
use guestscope::paging::Level;
use guestscope::registers::{parse_value, CpuState, RegisterError, TableRegister};
use guestscope::symbols::{SymbolError, SymbolMap, SymbolResolver};
use serde::Serialize;
use snafu::Snafu;
use std::path::PathBuf;

/// CLI errors for the inspector binary.
#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("Memory image error"), context(false))]
    Memory { source: MemoryError },
    #[snafu(display("Configuration error"), context(false))]
    Config { source: ConfigError },
    #[snafu(display("Translation error"), context(false))]
    Translation { source: TranslationError },
    #[snafu(display("Descriptor table error"), context(false))]
    Table { source: TableError },
    #[snafu(display("Symbol file error"), context(false))]
    Symbols { source: SymbolError },
    #[snafu(display("Register snapshot error"), context(false))]
    Registers { source: RegisterError },
    #[snafu(display("JSON error"), context(false))]
    Json { source: serde_json::Error },
    #[snafu(display("{message}"))]
    Other { message: String },
}

#[derive(Parser)]
#[command(name = "guestscope")]
#[command(about = "Inspect x86_64 page tables, GDT and IDT in a guest memory dump")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    guest: GuestArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GuestArgs {
    /// Raw guest physical memory dump
    #[arg(short, long)]
    image: PathBuf,

    /// Guest physical address of the first byte of the dump
    #[arg(long, default_value = "0", value_parser = parse_u64)]
    image_base: u64,

    /// Implemented physical address bits (MAXPHYADDR)
    #[arg(long, default_value_t = DEFAULT_PHYSICAL_BITS)]
    phys_bits: u32,

    /// JSON register snapshot with cr3, gdt and idt
    #[arg(short, long)]
    regs: Option<PathBuf>,

    /// CR3 value (overrides the snapshot)
    #[arg(long, value_parser = parse_u64)]
    cr3: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the page tables for linear addresses
    Translate {
        /// Linear addresses to translate
        #[arg(required = true, value_parser = parse_u64)]
        addresses: Vec<u64>,
    },

    /// Read bytes at a linear address
    Read {
        /// Linear start address
        #[arg(value_parser = parse_u64)]
        address: u64,

        /// Number of bytes
        #[arg(value_parser = parse_u64)]
        length: u64,
    },

    /// Dump one paging structure, folding repeated entries
    Table {
        /// Level of the structure
        #[arg(short, long, value_enum, default_value = "pml4")]
        level: TableLevel,

        /// Physical base of the structure (default: the root from CR3)
        #[arg(short, long, value_parser = parse_u64)]
        base: Option<u64>,
    },

    /// Decode the global descriptor table
    Gdt {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Decode the interrupt descriptor table
    Idt {
        #[command(flatten)]
        table: TableArgs,

        /// nm output or System.map used to name handlers
        #[arg(short, long)]
        symbols: Option<PathBuf>,
    },
}

/// Descriptor-table register override.
#[derive(Args)]
struct TableArgs {
    /// Linear base (overrides the snapshot)
    #[arg(long, value_parser = parse_u64)]
    base: Option<u64>,

    /// Limit (overrides the snapshot)
    #[arg(long, value_parser = parse_u16)]
    limit: Option<u16>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum TableLevel {
    Pml4,
    Pdpt,
    Pd,
    Pt,
}

impl From<TableLevel> for Level {
    fn from(level: TableLevel) -> Self {
        match level {
            TableLevel::Pml4 => Level::Pml4,
            TableLevel::Pdpt => Level::Pdpt,
            TableLevel::Pd => Level::Pd,
            TableLevel::Pt => Level::Pt,
        }
    }
}

fn parse_u64(text: &str) -> Result<u64, String> {
    parse_value(text).ok_or_else(|| format!("invalid 64-bit value {text:?}"))
}

fn parse_u16(text: &str) -> Result<u16, String> {
    parse_value(text).ok_or_else(|| format!("invalid 16-bit value {text:?}"))
}

/// Everything a command needs: the translator and the saved registers.
struct Session<'a> {
    mmu: Mmu<&'a GuestImage>,
    state: Option<CpuState>,
    cr3: Option<u64>,
    format: OutputFormat,
}

impl Session<'_> {
    fn cr3(&self) -> Result<u64, CliError> {
        self.cr3
            .or(self.state.map(|state| state.cr3))
            .ok_or_else(|| {
                OtherSnafu {
                    message: "no CR3 value: pass --cr3 or --regs",
                }
                .build()
            })
    }

    fn table_register(
        &self,
        args: &TableArgs,
        saved: impl Fn(&CpuState) -> TableRegister,
        name: &str,
    ) -> Result<TableRegister, CliError> {
        let saved = self.state.as_ref().map(saved);
        match (
            args.base.or(saved.map(|r| r.base)),
            args.limit.or(saved.map(|r| r.limit)),
        ) {
            (Some(base), Some(limit)) => Ok(TableRegister { base, limit }),
            _ => Err(OtherSnafu {
                message: format!("no {name} register: pass --base and --limit, or --regs"),
            }
            .build()),
        }
    }

    fn emit<T: Serialize>(&self, value: &T) -> Result<(), CliError> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        let mut cause = std::error::Error::source(&e);
        while let Some(inner) = cause {
            eprintln!("  caused by: {}", inner);
            cause = inner.source();
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let image = GuestImage::load(&cli.guest.image, cli.guest.image_base)?;
    let config = MmuConfig::default().with_physical_bits(cli.guest.phys_bits)?;
    let state = match &cli.guest.regs {
        Some(path) => Some(CpuState::load(path)?),
        None => None,
    };
    let session = Session {
        mmu: Mmu::new(&image, config)?,
        state,
        cr3: cli.guest.cr3,
        format: cli.format,
    };

    match cli.command {
        Commands::Translate { addresses } => cmd_translate(&session, &addresses),
        Commands::Read { address, length } => cmd_read(&session, address, length),
        Commands::Table { level, base } => cmd_table(&session, level.into(), base),
        Commands::Gdt { table } => cmd_gdt(&session, &table),
        Commands::Idt { table, symbols } => cmd_idt(&session, &table, symbols),
    }
}

fn cmd_translate(session: &Session<'_>, addresses: &[u64]) -> Result<(), CliError> {
    let cr3 = session.cr3()?;
    let translations = addresses
        .iter()
        .map(|&address| session.mmu.resolve(cr3, address))
        .collect::<Result<Vec<_>, _>>()?;

    match session.format {
        OutputFormat::Json => session.emit(&translations)?,
        OutputFormat::Text => {
            for translation in &translations {
                println!("{translation}\n");
            }
        }
    }
    Ok(())
}

fn cmd_read(session: &Session<'_>, address: u64, length: u64) -> Result<(), CliError> {
    let length = usize::try_from(length).map_err(|_| {
        OtherSnafu {
            message: format!("length {length} too large"),
        }
        .build()
    })?;
    let reader = LinearReader::new(&session.mmu, session.cr3()?);
    let bytes = reader.read(address, length)?;

    match session.format {
        OutputFormat::Json => session.emit(&serde_json::json!({
            "address": address,
            "bytes": bytes,
        }))?,
        OutputFormat::Text => {
            for (row, chunk) in bytes.chunks(16).enumerate() {
                let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
                let ascii: String = chunk.iter().map(|&b| printable(b)).collect();
                println!(
                    "{:#018x}: {:<47}  {}",
                    address + row as u64 * 16,
                    hex.join(" "),
                    ascii
                );
            }
        }
    }
    Ok(())
}

fn printable(byte: u8) -> char {
    if byte.is_ascii_graphic() || byte == b' ' {
        byte as char
    } else {
        '.'
    }
}

fn cmd_table(session: &Session<'_>, level: Level, base: Option<u64>) -> Result<(), CliError> {
    let base = match base {
        Some(base) => base,
        None => session.mmu.root_table(session.cr3()?),
    };
    let entries = session.mmu.table(level, base)?;
    let runs = compact(entries.into_iter().enumerate(), |a, b| a.raw == b.raw);

    match session.format {
        OutputFormat::Json => session.emit(&runs)?,
        OutputFormat::Text => {
            println!("{level} table at {base:#x}");
            for run in &runs {
                println!("{run}");
            }
        }
    }
    Ok(())
}

fn cmd_gdt(session: &Session<'_>, args: &TableArgs) -> Result<(), CliError> {
    let register = session.table_register(args, |state| state.gdt, "GDTR")?;
    let gdt = Gdt::new(register.base, register.limit);
    let reader = LinearReader::new(&session.mmu, session.cr3()?);
    let entries = gdt.decode(&reader)?;

    match session.format {
        OutputFormat::Json => session.emit(&entries)?,
        OutputFormat::Text => {
            println!("base: {:#x}, limit: {:#x}", gdt.base, gdt.limit);
            for entry in &entries {
                println!("{entry}");
            }
        }
    }
    Ok(())
}

/// JSON form of one folded IDT run.
#[derive(Serialize)]
struct IdtRun<'a> {
    start: usize,
    end: usize,
    label: String,
    gate: &'a GateDescriptor,
}

fn cmd_idt(
    session: &Session<'_>,
    args: &TableArgs,
    symbols: Option<PathBuf>,
) -> Result<(), CliError> {
    let register = session.table_register(args, |state| state.idt, "IDTR")?;
    let idt = Idt::new(register.base, register.limit);
    let symbols = symbols.map(SymbolMap::load).transpose()?;
    let resolver = symbols.as_ref().map(|map| map as &dyn SymbolResolver);

    let reader = LinearReader::new(&session.mmu, session.cr3()?);
    let runs: Vec<CompactedRun<GateDescriptor>> = Idt::compact(idt.decode(&reader)?);

    match session.format {
        OutputFormat::Json => {
            let rows: Vec<IdtRun<'_>> = runs
                .iter()
                .map(|run| IdtRun {
                    start: run.start,
                    end: run.end,
                    label: run.entry.label(resolver),
                    gate: &run.entry,
                })
                .collect();
            session.emit(&rows)?;
        }
        OutputFormat::Text => {
            println!(
                "base: {:#x}, limit: {:#x}, {} gates",
                idt.base,
                idt.limit,
                idt.len()
            );
            for line in Idt::render(&runs, resolver) {
                println!("{line}");
            }
        }
    }
    Ok(())
}
