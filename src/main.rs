use clap::{Parser, Subcommand};
use plainblog::pipeline::{Blog, BlogBuilder};
use plainblog::request::HttpRequest;
use plainblog::{config, logging, output, static_build};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "plainblog")]
#[command(about = "File-based weblog engine: plain text entries in, pages out")]
#[command(long_about = "\
File-based weblog engine: plain text entries in, pages out

Entries are text files under the data directory. Directories are categories
and a file's modification time is its publication date.

Content structure:

  content/
  ├── about.txt                    # Entry: first line is the title
  └── blog/                        # Category \"blog\"
      ├── first-post.txt
      └── rust/                    # Category \"blog/rust\"
          └── lifetimes.txt

Entry file:

  Lifetimes, briefly               # Title
  #parser markdown                 # Metadata lines: #key value
  #date 2024-03-07 09:30
  Body text follows.

Request paths:

  /                                Newest entries, all categories
  /blog/rust/                      Newest entries under blog/rust
  /blog/rust/lifetimes.html        One entry
  /2024/Mar/07                     Entries from that day (also /2024/03/07)
  /blog/2024/Mar                   Entries in blog from March 2024
  /index.rss                       Any listing in another flavour

Run 'plainblog gen-config' to generate a documented config.toml.")]
#[command(version = env!("PLAINBLOG_VERSION"))]
struct Cli {
    /// Config file
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one request path to stdout
    Render {
        /// Request path, e.g. /blog/2024/Mar or /about.html
        path: String,
        /// Query string, e.g. flav=rss
        #[arg(long, default_value = "")]
        query: String,
        /// Print the status line and headers before the body
        #[arg(long)]
        headers: bool,
    },
    /// Render the whole blog into static.dir
    Build {
        /// Only re-render pages whose sources changed since the last build
        #[arg(long)]
        incremental: bool,
        /// List what would be rendered without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify config, data directory, parsers and plugins
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Render {
            path,
            query,
            headers,
        } => {
            let blog = load_blog(&cli.config, cli.verbose)?;
            let response = blog.handle(HttpRequest::new(path, query))?;
            output::print_render_output(&response, headers);
        }
        Command::Build {
            incremental,
            dry_run,
        } => {
            let blog = load_blog(&cli.config, cli.verbose)?;
            if dry_run {
                let plan = static_build::plan(&blog, incremental)?;
                blog.cache().close()?;
                output::print_plan(&plan);
            } else {
                run_build(&blog, incremental)?;
            }
        }
        Command::Check => {
            let blog = load_blog(&cli.config, cli.verbose)?;
            let report = blog.check();
            output::print_check_report(&report);
            if !report.is_ok() {
                return Err("installation check failed".into());
            }
            println!("==> Installation looks good");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load config, install logging and the thread pool, assemble the blog.
fn load_blog(config_path: &Path, verbose: bool) -> Result<Blog, Box<dyn std::error::Error>> {
    let site_config = config::load_config(config_path)?;
    logging::init(&site_config.logging, verbose)?;
    init_thread_pool(&site_config.processing);
    Ok(BlogBuilder::new(site_config).build()?)
}

fn run_build(blog: &Blog, incremental: bool) -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = static_build::static_dir(blog.config())?;
    println!("==> Rendering {}", out_dir.display());

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_build_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = static_build::build(blog, incremental, Some(tx));
    printer.join().ok();
    let result = result?;

    output::print_build_summary(&result);
    if result.failed > 0 {
        return Err(format!("{} pages failed to render", result.failed).into());
    }
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
