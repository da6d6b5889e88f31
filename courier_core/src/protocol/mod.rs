/*!
 * Protocol layer: what goes on the wire.
 *
 * - `hit`: delivery units (page views, events, exceptions) and their
 *   key/value serialization
 * - `escape`: percent-encoding and query/line rendering
 * - `constants`: endpoints, protocol version, user agent
 */

pub mod constants;
pub mod escape;
pub mod hit;
