use super::attributes::PresenceAttributes;
use super::clusters::{IlluminanceMeasurementHandler, OccupancySensingHandler};
use super::device_info::device_info;
use super::device_types::{DEV_TYPE_LIGHT_SENSOR, DEV_TYPE_OCCUPANCY_SENSOR};
use super::netif::{FilteredNetifs, InterfaceAddresses};
use super::notifier::{ChangeSignal, ClusterNotifier};
use crate::config::MatterConfig;
use embassy_futures::select::{Either, select, select4};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use log::{error, info};
use rs_matter::dm::IMBuffer;
use rs_matter::dm::clusters::basic_info::BasicInfoConfig;
use rs_matter::dm::clusters::desc::{self, ClusterHandler as _};
use rs_matter::dm::devices::test::TEST_DEV_ATT;
use rs_matter::dm::endpoints;
use rs_matter::dm::subscriptions::DefaultSubscriptions;
use rs_matter::dm::{
    Async, AsyncHandler, AsyncMetadata, DataModel, Dataver, EmptyHandler, Endpoint, EpClMatcher,
    Node,
};
use rs_matter::error::{Error, ErrorCode};
use rs_matter::pairing::DiscoveryCapabilities;
use rs_matter::pairing::qr::QrTextType;
use rs_matter::persist::{NO_NETWORKS, Psm};
use rs_matter::respond::DefaultResponder;
use rs_matter::transport::network::mdns::builtin::{BuiltinMdnsResponder, Host};
use rs_matter::transport::network::mdns::{
    MDNS_IPV4_BROADCAST_ADDR, MDNS_IPV6_BROADCAST_ADDR, MDNS_SOCKET_DEFAULT_BIND_ADDR,
};
use rs_matter::utils::init::InitMaybeUninit;
use rs_matter::utils::select::Coalesce;
use rs_matter::utils::storage::pooled::PooledBuffers;
use rs_matter::{BasicCommData, MATTER_PORT, Matter, clusters, devices};
use socket2::{Domain, Protocol, Socket, Type};
use static_cell::StaticCell;
use std::fs;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::pin::pin;
use std::sync::{Arc, OnceLock};

/// Static cells for Matter resources (required for 'static lifetime)
static DEV_DET: StaticCell<BasicInfoConfig<'static>> = StaticCell::new();
static MATTER: StaticCell<Matter> = StaticCell::new();
static BUFFERS: StaticCell<PooledBuffers<10, NoopRawMutex, IMBuffer>> = StaticCell::new();
static SUBSCRIPTIONS: StaticCell<DefaultSubscriptions> = StaticCell::new();
static PSM: StaticCell<Psm<4096>> = StaticCell::new();

/// Raised by attribute writes, consumed by the subscription reporter
static OCCUPANCY_CHANGED: ChangeSignal = Signal::new();
static ILLUMINANCE_CHANGED: ChangeSignal = Signal::new();

/// Static hostname storage for mDNS (needs 'static lifetime for Host struct)
static HOSTNAME: OnceLock<String> = OnceLock::new();

/// Interface filter for diagnostics, fixed at startup
static NETIFS: OnceLock<FilteredNetifs> = OnceLock::new();

/// Endpoint carrying the presence sensor clusters
pub const SENSOR_ENDPOINT_ID: u16 = 1;

/// Directory for persistence data
const PERSIST_DIR: &str = ".config/presence-matter-bridge";
const PERSIST_FILE: &str = "matter.bin";

/// Commissioning window duration when not yet commissioned
const COMM_WINDOW_TIMEOUT_SECS: u16 = 900;

/// Get the persistence file path
fn get_persist_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PERSIST_DIR)
        .join(PERSIST_FILE)
}

/// Node definition: root endpoint plus the presence sensor endpoint
const NODE: Node<'static> = Node {
    id: 0,
    endpoints: &[
        endpoints::root_endpoint(rs_matter::dm::clusters::net_comm::NetworkType::Ethernet),
        Endpoint {
            id: SENSOR_ENDPOINT_ID,
            device_types: devices!(DEV_TYPE_OCCUPANCY_SENSOR, DEV_TYPE_LIGHT_SENSOR),
            clusters: clusters!(
                desc::DescHandler::CLUSTER,
                OccupancySensingHandler::CLUSTER,
                IlluminanceMeasurementHandler::CLUSTER
            ),
        },
    ],
};

/// Build the data model handler for the presence endpoint
fn dm_handler<'a>(
    matter: &'a Matter<'a>,
    netifs: &'a FilteredNetifs,
    occupancy_handler: &'a OccupancySensingHandler,
    illuminance_handler: &'a IlluminanceMeasurementHandler,
) -> impl AsyncMetadata + AsyncHandler + 'a {
    (
        NODE,
        endpoints::with_eth(
            &(),
            netifs,
            matter.rand(),
            endpoints::with_sys(
                &false,
                matter.rand(),
                EmptyHandler
                    .chain(
                        EpClMatcher::new(
                            Some(SENSOR_ENDPOINT_ID),
                            Some(desc::DescHandler::CLUSTER.id),
                        ),
                        Async(desc::DescHandler::new(Dataver::new_rand(matter.rand())).adapt()),
                    )
                    .chain(
                        EpClMatcher::new(
                            Some(SENSOR_ENDPOINT_ID),
                            Some(OccupancySensingHandler::CLUSTER.id),
                        ),
                        Async(occupancy_handler),
                    )
                    .chain(
                        EpClMatcher::new(
                            Some(SENSOR_ENDPOINT_ID),
                            Some(IlluminanceMeasurementHandler::CLUSTER.id),
                        ),
                        Async(illuminance_handler),
                    ),
            ),
        ),
    )
}

/// Forward attribute changes to the subscription processor so subscribed
/// controllers get a report immediately.
async fn report_changes(
    subscriptions: &DefaultSubscriptions,
    occupancy: ClusterNotifier,
    illuminance: ClusterNotifier,
) -> Result<(), Error> {
    loop {
        let changed = match select(occupancy.changed(), illuminance.changed()).await {
            Either::First(()) => occupancy,
            Either::Second(()) => illuminance,
        };
        subscriptions.notify_cluster_changed(changed.endpoint_id(), changed.cluster_id());
    }
}

/// Create a non-blocking dual-stack UDP socket bound to `addr`.
fn bind_udp(addr: SocketAddr, what: &str) -> Result<Socket, Error> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).map_err(|e| {
        error!("Failed to create {} socket: {}", what, e);
        ErrorCode::StdIoError
    })?;
    socket.set_reuse_address(true).map_err(|e| {
        error!("Failed to set SO_REUSEADDR on {} socket: {}", what, e);
        ErrorCode::StdIoError
    })?;
    socket.set_only_v6(false).map_err(|e| {
        error!("Failed to set IPV6_V6ONLY=false on {} socket: {}", what, e);
        ErrorCode::StdIoError
    })?;
    socket.set_nonblocking(true).map_err(|e| {
        error!("Failed to set non-blocking on {} socket: {}", what, e);
        ErrorCode::StdIoError
    })?;
    socket.bind(&addr.into()).map_err(|e| {
        error!("Failed to bind {} socket to {:?}: {}", what, addr, e);
        ErrorCode::StdIoError
    })?;
    Ok(socket)
}

/// Run the Matter stack serving the presence attributes.
///
/// Exposes endpoint 1 as an occupancy sensor and a light sensor, handles
/// commissioning, mDNS and persistence. `attributes` is marked online while
/// the data model is serving, which is what lets the bridge's sink accept
/// writes.
pub async fn run_matter_stack(
    config: &MatterConfig,
    attributes: Arc<PresenceAttributes>,
) -> Result<(), Error> {
    info!("Initializing Matter stack...");

    let dev_det = DEV_DET.init(device_info(config));
    let dev_comm = BasicCommData {
        password: config.passcode,
        discriminator: config.discriminator,
    };

    // Device attestation still uses the rs-matter test certificates
    let matter = MATTER.uninit().init_with(Matter::init(
        dev_det,
        dev_comm,
        &TEST_DEV_ATT,
        rs_matter::utils::epoch::sys_epoch,
        rs_matter::utils::rand::sys_rand,
        MATTER_PORT,
    ));

    matter.initialize_transport_buffers()?;

    // Resolve addresses before binding: the transport socket must use the
    // same IPv6 source address that mDNS advertises
    let interface_name = config.interface.as_str();
    let addrs = InterfaceAddresses::lookup(interface_name)?;

    let Some(ipv4_addr) = addrs.ipv4.first().copied() else {
        error!("No IPv4 address found on interface '{}'", interface_name);
        return Err(ErrorCode::MdnsError.into());
    };
    let ipv6_addr = addrs.ipv6.first().copied().unwrap_or_else(|| {
        info!(
            "No global IPv6 address on '{}', using unspecified",
            interface_name
        );
        Ipv6Addr::UNSPECIFIED
    });

    info!(
        "Using interface '{}' (index {}) with {} and {}",
        interface_name, addrs.index, ipv4_addr, ipv6_addr
    );

    let bind_addr = SocketAddr::new(IpAddr::V6(ipv6_addr), MATTER_PORT);
    let socket = async_io::Async::<UdpSocket>::new(bind_udp(bind_addr, "Matter")?.into())
        .map_err(|e| {
            error!("Failed to create async socket: {}", e);
            ErrorCode::StdIoError
        })?;
    info!("Matter UDP socket bound to {:?}", bind_addr);

    let persist_path = get_persist_path();
    if let Some(parent) = persist_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        error!("Failed to create persistence directory {:?}: {}", parent, e);
    }

    let psm = PSM.uninit().init_with(Psm::init());
    if let Err(e) = psm.load(&persist_path, matter, NO_NETWORKS) {
        // Start fresh
        error!(
            "Failed to load persisted state from {:?}: {:?}",
            persist_path, e
        );
    }

    if matter.is_commissioned() {
        info!("Device already commissioned, skipping commissioning window");
        info!("  (Delete {:?} to reset commissioning)", persist_path);
    } else {
        info!(
            "Opening commissioning window for {} seconds...",
            COMM_WINDOW_TIMEOUT_SECS
        );
        matter.open_basic_comm_window(COMM_WINDOW_TIMEOUT_SECS)?;

        info!("Matter device ready for commissioning");
        info!("  Discriminator: {}", config.discriminator);
        info!("  Passcode: {}", config.passcode);

        if let Err(e) = matter.print_standard_qr_text(DiscoveryCapabilities::IP) {
            error!("Failed to print QR text: {:?}", e);
        }
        if let Err(e) =
            matter.print_standard_qr_code(QrTextType::Unicode, DiscoveryCapabilities::IP)
        {
            error!("Failed to print QR code: {:?}", e);
        }
    }

    let buffers = BUFFERS.uninit().init_with(PooledBuffers::init(0));
    let subscriptions: &DefaultSubscriptions = SUBSCRIPTIONS
        .uninit()
        .init_with(DefaultSubscriptions::init());

    // Randomized Dataver seeds so controllers never see a stale version
    let occupancy_handler =
        OccupancySensingHandler::new(Dataver::new_rand(matter.rand()), attributes.clone());
    let illuminance_handler =
        IlluminanceMeasurementHandler::new(Dataver::new_rand(matter.rand()), attributes.clone());

    let netifs = NETIFS.get_or_init(|| {
        let name: &'static str = Box::leak(config.interface.clone().into_boxed_str());
        FilteredNetifs::new(name)
    });

    let handler = dm_handler(matter, netifs, &occupancy_handler, &illuminance_handler);
    let dm = DataModel::new(matter, buffers, subscriptions, handler);
    let responder = DefaultResponder::new(&dm);

    let mut transport = pin!(matter.run(&socket, &socket));

    // mDNS gets its own socket on port 5353
    let mdns_socket = bind_udp(MDNS_SOCKET_DEFAULT_BIND_ADDR.into(), "mDNS")?;
    let mdns_socket = async_io::Async::<UdpSocket>::new_nonblocking(mdns_socket.into())
        .map_err(|e| {
            error!("Failed to create async mDNS socket: {}", e);
            ErrorCode::MdnsError
        })?;
    mdns_socket
        .get_ref()
        .join_multicast_v6(&MDNS_IPV6_BROADCAST_ADDR, addrs.index)
        .map_err(|e| {
            error!("Failed to join IPv6 multicast group: {}", e);
            ErrorCode::MdnsError
        })?;
    mdns_socket
        .get_ref()
        .join_multicast_v4(&MDNS_IPV4_BROADCAST_ADDR, &ipv4_addr)
        .map_err(|e| {
            error!("Failed to join IPv4 multicast group: {}", e);
            ErrorCode::MdnsError
        })?;
    info!("mDNS socket bound to {:?}", MDNS_SOCKET_DEFAULT_BIND_ADDR);

    let hostname =
        HOSTNAME.get_or_init(|| gethostname::gethostname().to_string_lossy().into_owned());
    let host = Host {
        id: 0,
        hostname,
        ip: ipv4_addr.octets().into(),
        ipv6: ipv6_addr.octets().into(),
    };

    let mdns_responder = BuiltinMdnsResponder::new(matter);
    let mut mdns = pin!(mdns_responder.run(
        &mdns_socket,
        &mdns_socket,
        &host,
        Some(ipv4_addr.octets().into()),
        Some(addrs.index),
    ));

    let mut respond = pin!(responder.run::<4, 4>());
    let mut dm_job = pin!(dm.run());
    let mut persist = pin!(psm.run(&persist_path, matter, NO_NETWORKS));

    let occupancy_notifier = ClusterNotifier::new(
        &OCCUPANCY_CHANGED,
        SENSOR_ENDPOINT_ID,
        OccupancySensingHandler::CLUSTER.id,
    );
    let illuminance_notifier = ClusterNotifier::new(
        &ILLUMINANCE_CHANGED,
        SENSOR_ENDPOINT_ID,
        IlluminanceMeasurementHandler::CLUSTER.id,
    );
    attributes.occupancy.set_notifier(occupancy_notifier);
    attributes.illuminance.set_notifier(illuminance_notifier);
    let mut report = pin!(report_changes(
        subscriptions,
        occupancy_notifier,
        illuminance_notifier
    ));

    attributes.set_online(true);
    info!("Matter stack running. Waiting for controller connections...");

    let result = select4(
        &mut transport,
        &mut mdns,
        select(&mut respond, &mut dm_job).coalesce(),
        select(&mut persist, &mut report).coalesce(),
    )
    .coalesce()
    .await;

    attributes.set_online(false);

    if let Err(e) = result {
        error!("Matter stack error: {:?}", e);
        return Err(e);
    }

    Ok(())
}
